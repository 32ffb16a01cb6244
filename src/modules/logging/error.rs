//! Logging error types

use std::fmt;

/// Result type for logging operations
pub type LogResult<T> = Result<T, LogError>;

/// Logging errors
#[derive(Debug)]
pub enum LogError {
    /// Invalid filter directive
    InvalidFilter(String),

    /// A global subscriber is already installed
    AlreadyInitialized(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "invalid filter directive: {}", msg),
            Self::AlreadyInitialized(msg) => write!(f, "logging already initialized: {}", msg),
        }
    }
}

impl std::error::Error for LogError {}

impl From<tracing_subscriber::filter::ParseError> for LogError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        Self::InvalidFilter(err.to_string())
    }
}
