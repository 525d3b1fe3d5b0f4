//! Pin model and public-key digest computation.

use crate::error::{Result, TrustError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A trust-on-first-use pin for one hostname.
///
/// Created on the first successful handshake and immutable afterwards;
/// only an explicit user-initiated revoke removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub hostname: String,
    /// Base64-encoded SHA-256 of the leaf certificate's SubjectPublicKeyInfo
    pub spki_sha256: String,
    pub first_seen_at: DateTime<Utc>,
}

impl Pin {
    /// Create a pin observed now.
    pub fn new(hostname: impl Into<String>, spki_sha256: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            spki_sha256: spki_sha256.into(),
            first_seen_at: Utc::now(),
        }
    }

    /// Whether a presented digest matches this pin.
    pub fn matches(&self, spki_sha256: &str) -> bool {
        self.spki_sha256 == spki_sha256
    }
}

/// Compute the base64 SHA-256 digest of a certificate's public key.
///
/// The digest covers the full SubjectPublicKeyInfo DER, so algorithm
/// parameters are part of the pinned identity, not just the key bits.
pub fn spki_sha256(cert_der: &[u8]) -> Result<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| TrustError::CertificateParse(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(cert.tbs_certificate.subject_pki.raw);
    Ok(BASE64.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_matches_exact_digest_only() {
        let pin = Pin::new("media.example.com", "digest-a");
        assert!(pin.matches("digest-a"));
        assert!(!pin.matches("digest-b"));
    }

    #[test]
    fn test_garbage_der_is_a_parse_error() {
        let err = spki_sha256(b"not a certificate").unwrap_err();
        assert!(matches!(err, TrustError::CertificateParse(_)));
    }

    #[test]
    fn test_pin_serde_round_trip() {
        let pin = Pin::new("media.example.com", "digest-a");
        let json = serde_json::to_string(&pin).unwrap();
        let back: Pin = serde_json::from_str(&json).unwrap();
        assert_eq!(pin, back);
    }
}
