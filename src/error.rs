//! Error types for the cache
//!
//! Provides unified error handling using thiserror. The best-effort facade
//! methods never surface these; the `try_*` variants do.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Storage substrate could not be opened
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// An individual storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payload could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Value could not be encoded
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Invalid configuration or substitution table
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Blocking task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl CacheError {
    /// Returns true if the error originates from the storage substrate.
    pub fn is_storage(&self) -> bool {
        matches!(self, CacheError::Unavailable(_) | CacheError::Storage(_))
    }
}

// == Conversions ==
impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
