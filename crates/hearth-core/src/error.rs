//! Error types for hearth-core

use thiserror::Error;

/// Result type alias using hearth-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hearth-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local key-value storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote document store error
    #[error("Remote error: {0}")]
    Remote(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
