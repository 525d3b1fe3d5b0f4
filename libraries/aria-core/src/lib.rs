//! Aria Player Core
//!
//! Platform-agnostic foundation for the server-connection libraries:
//! shared ID types, the encrypted `SecretStore` boundary, server
//! identification types, and the retry policy used by both the request
//! coordinator and endpoint discovery.
//!
//! # Example
//!
//! ```rust
//! use aria_core::retry::{FailureKind, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let class = RetryPolicy::classify(FailureKind::Status(503));
//! assert!(class.is_retryable());
//! let delay = policy.backoff(0, FailureKind::Status(503));
//! assert!(delay <= policy.cap + policy.cap / 10);
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use retry::{ErrorClass, FailureKind, RetryPolicy};
pub use traits::{MemorySecretStore, SecretStore};
pub use types::{DeviceId, NetworkClass, ServerInfo, UserId};
