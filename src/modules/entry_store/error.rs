//! Entry store errors.

use thiserror::Error;

/// Errors returned by entry stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The entry to commit does not exist.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// An entry with this name already exists.
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// The entry name is not usable in a request path.
    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
