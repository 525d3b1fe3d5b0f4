//! Types for Aria server API requests and responses.

use aria_core::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Authentication Types
// =============================================================================

/// Login credentials.
///
/// Held only for the duration of the login call; the client keeps tokens,
/// never passwords.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request body for the login endpoint.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_id: String,
    pub device_name: String,
}

/// Response from successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Token validity in seconds
    pub expires_in: u64,
    pub user_id: String,
    pub username: String,
}

/// Request body for token refresh.
#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Response from token refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Current user info (`GET /api/auth/me`).
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub created_at: String,
}

// =============================================================================
// Session Persistence
// =============================================================================

/// Session state as written to the encrypted secret store.
///
/// Wall-clock `token_issued_at` lets a restored session estimate how much
/// of the validity window has already elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub server_url: String,
    pub user_id: UserId,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_issued_at: DateTime<Utc>,
    pub token_validity_secs: u64,
}
