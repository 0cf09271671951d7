//! Error types for the submission limiter.

use thiserror::Error;

/// Main error type for submission limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store could not be read or written
    #[error("Store error: {0}")]
    Store(String),

    /// Counter table could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for LimiterError {
    fn from(err: config::ConfigError) -> Self {
        LimiterError::Config(err.to_string())
    }
}

/// Result type alias for submission limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
