//! Error types for the Aria server client.
//!
//! `ClientError` is the taxonomy the rest of the application sees.
//! Retryable classes are retried internally and only surface once the
//! budget is exhausted; each surfaced network error keeps the hostname,
//! attempt count, and last HTTP status for diagnostics. Token values
//! never appear in error payloads.

use thiserror::Error;

/// Errors surfaced by the server client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection could not be established after the retry budget
    #[error("Server {hostname} unreachable after {attempts} attempts")]
    NetworkUnreachable { hostname: String, attempts: u32 },

    /// Request timed out after the retry budget
    #[error("Request to {hostname} timed out after {attempts} attempts")]
    Timeout { hostname: String, attempts: u32 },

    /// Server signalled overload (429/503) and stayed busy through the budget
    #[error("Server {hostname} busy ({status}) after {attempts} attempts")]
    ServerBusy {
        hostname: String,
        status: u16,
        attempts: u32,
    },

    /// Server returned an error response
    #[error("Server {hostname} error ({status}) after {attempts} attempts: {message}")]
    ServerError {
        hostname: String,
        status: u16,
        attempts: u32,
        message: String,
    },

    /// Session is expired or failed; a new login is required
    #[error("Authentication expired, login required")]
    AuthExpired,

    /// Login was rejected by the server
    #[error("Invalid username or password")]
    AuthInvalidCredentials,

    /// Presented server certificate does not match the stored pin
    #[error("Certificate pin mismatch for {hostname}")]
    CertificatePinMismatch { hostname: String },

    /// Endpoint discovery exhausted every candidate
    #[error("No reachable endpoint among {attempted} candidates")]
    NoReachableEndpoint { attempted: usize },

    /// The operation was cancelled (logout or shutdown)
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid server address
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse a server response
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// HTTP plumbing failed outside the classified taxonomy
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Secret store or serialization failure
    #[error("Store error: {0}")]
    Store(#[from] aria_core::CoreError),
}

impl From<aria_discovery::DiscoveryError> for ClientError {
    fn from(e: aria_discovery::DiscoveryError) -> Self {
        use aria_discovery::DiscoveryError;
        match e {
            DiscoveryError::InvalidAddress(msg) => Self::InvalidUrl(msg),
            DiscoveryError::NoReachableEndpoint { attempted } => {
                Self::NoReachableEndpoint { attempted }
            }
            DiscoveryError::Cancelled => Self::Cancelled,
            DiscoveryError::Client(e) => Self::Request(e),
        }
    }
}

impl From<aria_trust::TrustError> for ClientError {
    fn from(e: aria_trust::TrustError) -> Self {
        use aria_trust::TrustError;
        match e {
            TrustError::PinMismatch { hostname } => Self::CertificatePinMismatch { hostname },
            TrustError::CertificateParse(msg) => Self::Parse(msg),
            TrustError::Store(e) => Self::Store(e),
        }
    }
}

/// Result type for server client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
