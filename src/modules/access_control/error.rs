//! Error types for access control.

use crate::modules::entry_store::StoreError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for access control operations.
pub type AccessControlResult<T> = Result<T, AccessControlError>;

/// Errors that can occur while setting up or running access control.
#[derive(Debug, Error)]
pub enum AccessControlError {
    /// A data file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The geolocation database could not be opened.
    #[error("invalid geolocation database '{path}': {message}")]
    GeoDatabase {
        /// Path of the database.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A line of ipcat data is malformed.
    #[error("invalid ipcat data at line {line}: {message}")]
    CategoryData {
        /// One-based line number.
        line: usize,
        /// Error message.
        message: String,
    },

    /// The DNS resolver could not be created.
    #[error("DNS resolver error: {0}")]
    Resolver(String),

    /// The entry store failed.
    #[error("entry store error: {0}")]
    Store(#[from] StoreError),

    /// A background update task did not complete.
    #[error("update task failed: {0}")]
    Task(String),
}

/// Errors from an external lookup source.
///
/// A missing source and a failing source are reported separately so
/// callers can log them apart. Both deny when a rule needs the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No source of this kind is configured.
    #[error("no {0} source configured")]
    NotAvailable(&'static str),

    /// The source returned an error.
    #[error("{kind} lookup failed: {message}")]
    Failed {
        /// Kind of source.
        kind: &'static str,
        /// Error message.
        message: String,
    },

    /// The source did not answer in time.
    #[error("{kind} lookup timed out after {timeout:?}")]
    TimedOut {
        /// Kind of source.
        kind: &'static str,
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

impl LookupError {
    /// Create a lookup failure.
    pub fn failed(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Whether the source is simply absent.
    #[must_use]
    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::NotAvailable(_))
    }
}
