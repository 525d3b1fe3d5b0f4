//! Aria Player Server Client
//!
//! The network-resilience core of the Aria Player client: it maintains a
//! long-lived authenticated session against one Aria server and recovers
//! transparently from token expiry and transient failures.
//!
//! # Features
//!
//! - **Authentication**: login with username/password, single-flight
//!   token refresh (one exchange per failure episode, however many
//!   requests hit the expired token), proactive renewal before expiry
//! - **Resilience**: failure-class-aware retry with exponential backoff
//!   and jitter; one auth retry per request, never more
//! - **Discovery**: a raw user-entered address is expanded and probed
//!   concurrently until a reachable Aria server answers
//! - **Trust**: trust-on-first-use certificate pinning on every TLS
//!   handshake, with no silent bypass
//!
//! # Example
//!
//! ```ignore
//! use aria_server_client::{ApiRequest, AriaServerClient, ClientConfig, Credentials};
//! use aria_core::MemorySecretStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let secrets = Arc::new(MemorySecretStore::new());
//!     let client = AriaServerClient::new(ClientConfig::default(), secrets).await?;
//!
//!     let login = client
//!         .login("media.example.com", &Credentials::new("user", "pass"))
//!         .await?;
//!     println!("Logged in as {}", login.username);
//!
//!     let response = client.execute(&ApiRequest::get("/api/library/tracks")).await?;
//!     println!("Library status: {}", response.status());
//!
//!     client.logout().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod auth;
mod client;
mod client_cache;
mod config;
mod coordinator;
mod error;
mod session;
mod types;

// Re-export main types
pub use client::AriaServerClient;
pub use config::ClientConfig;
pub use coordinator::ApiRequest;
pub use error::{ClientError, Result};
pub use session::{RefreshReason, RefreshState};
pub use types::{
    Credentials, LoginResponse, PersistedSession, RefreshTokenResponse, UserInfo,
};

// Re-export sub-clients for direct use if needed
pub use auth::AuthClient;
