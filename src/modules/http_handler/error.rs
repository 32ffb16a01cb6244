//! Error types for the HTTP handler module.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur in HTTP handling.
#[derive(Debug, Error)]
pub enum HttpError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The server is already running.
    #[error("Server already running")]
    AlreadyRunning,

    /// The server is not running.
    #[error("Server not running")]
    NotRunning,
}

/// Result type for HTTP operations.
pub type HttpResult<T> = Result<T, HttpError>;
