//! Error types for endpoint discovery.

use thiserror::Error;

/// Errors that can occur while resolving a server address.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The user-entered address could not be turned into any candidate URL
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// Every candidate was probed and none answered as an Aria server
    #[error("No reachable endpoint among {attempted} candidates")]
    NoReachableEndpoint { attempted: usize },

    /// Discovery was cancelled (logout or shutdown)
    #[error("Discovery cancelled")]
    Cancelled,

    /// The probe HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
