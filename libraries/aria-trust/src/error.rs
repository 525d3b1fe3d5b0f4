//! Error types for certificate trust handling.

use thiserror::Error;

/// Errors that can occur while validating or persisting certificate pins.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Presented certificate does not match the stored pin
    #[error("Certificate pin mismatch for {hostname}")]
    PinMismatch { hostname: String },

    /// Presented certificate could not be parsed
    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    /// Pin persistence failed
    #[error("Pin store error: {0}")]
    Store(#[from] aria_core::CoreError),
}

/// Result type for trust operations.
pub type Result<T> = std::result::Result<T, TrustError>;
