/// Core error types for Aria Player
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type shared by the connection libraries
#[derive(Error, Debug)]
pub enum CoreError {
    /// Secret store read/write failed
    #[error("Secret store error: {0}")]
    Store(String),

    /// Stored value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Create a store error from any displayable source
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
