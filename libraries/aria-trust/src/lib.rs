//! Aria Player Certificate Trust
//!
//! Trust-on-first-use certificate pinning for connections to an Aria
//! server. The first validated handshake against a hostname pins the
//! SHA-256 of the presented public key; every later handshake must
//! present the same key or the connection is rejected. Pins only change
//! through an explicit user-initiated revoke.
//!
//! # Example
//!
//! ```ignore
//! use aria_trust::{PinningVerifier, TrustStore};
//! use std::sync::Arc;
//!
//! let trust = Arc::new(TrustStore::load(secret_store).await?);
//! let tls = PinningVerifier::client_config(trust.clone());
//! let http = reqwest::Client::builder()
//!     .use_preconfigured_tls(tls)
//!     .build()?;
//! ```

#![forbid(unsafe_code)]

mod error;
mod pin;
mod store;
mod verifier;

pub use error::{Result, TrustError};
pub use pin::{spki_sha256, Pin};
pub use store::{TrustDecision, TrustStore};
pub use verifier::PinningVerifier;
