//! Token-exchange calls against the Aria server auth endpoints.

use crate::error::{ClientError, Result};
use crate::types::{
    Credentials, LoginRequest, LoginResponse, RefreshTokenRequest, RefreshTokenResponse, UserInfo,
};
use reqwest::Client;
use tracing::{debug, info, warn};

/// Authentication client for an Aria server.
///
/// Borrows the HTTP client and base URL; all session bookkeeping lives in
/// the session manager, this type only speaks the wire protocol.
pub struct AuthClient<'a> {
    http: &'a Client,
    base_url: &'a str,
}

impl<'a> AuthClient<'a> {
    pub(crate) fn new(http: &'a Client, base_url: &'a str) -> Self {
        Self { http, base_url }
    }

    /// Exchange credentials for tokens.
    pub async fn login(
        &self,
        credentials: &Credentials,
        device_id: &str,
        device_name: &str,
    ) -> Result<LoginResponse> {
        let url = format!("{}/api/auth/login", self.base_url);
        debug!(url = %url, username = %credentials.username, "Attempting login");

        let request = LoginRequest {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();

        if status.is_success() {
            let login: LoginResponse = response.json().await.map_err(|e| {
                ClientError::Parse(format!("Failed to parse login response: {e}"))
            })?;

            info!(
                username = %login.username,
                user_id = %login.user_id,
                expires_in = login.expires_in,
                "Login successful"
            );
            Ok(login)
        } else if status.as_u16() == 401 {
            warn!(status = %status, "Login failed: invalid credentials");
            Err(ClientError::AuthInvalidCredentials)
        } else {
            Err(server_error(status.as_u16(), response).await)
        }
    }

    /// Exchange a refresh token for a fresh token pair.
    ///
    /// A 401 here means the refresh token itself is no longer accepted;
    /// the session cannot recover without a new login.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshTokenResponse> {
        let url = format!("{}/api/auth/refresh", self.base_url);
        debug!(url = %url, "Refreshing access token");

        let request = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();

        if status.is_success() {
            let refreshed: RefreshTokenResponse = response.json().await.map_err(|e| {
                ClientError::Parse(format!("Failed to parse refresh response: {e}"))
            })?;
            debug!("Token refresh successful");
            Ok(refreshed)
        } else if status.as_u16() == 401 {
            warn!("Token refresh rejected: refresh token expired or invalid");
            Err(ClientError::AuthExpired)
        } else {
            Err(server_error(status.as_u16(), response).await)
        }
    }

    /// Fetch the user behind an access token.
    pub async fn current_user(&self, access_token: &str) -> Result<UserInfo> {
        let url = format!("{}/api/auth/me", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::Parse(format!("Failed to parse user info: {e}")))
        } else if status.as_u16() == 401 {
            Err(ClientError::AuthExpired)
        } else {
            Err(server_error(status.as_u16(), response).await)
        }
    }

    /// Whether an access token is still accepted by the server.
    pub async fn validate_token(&self, access_token: &str) -> Result<bool> {
        match self.current_user(access_token).await {
            Ok(_) => Ok(true),
            Err(ClientError::AuthExpired) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn map_send_error(e: reqwest::Error) -> ClientError {
    let hostname = e
        .url()
        .and_then(|u| u.host_str())
        .unwrap_or_default()
        .to_string();
    if e.is_timeout() {
        ClientError::Timeout {
            hostname,
            attempts: 1,
        }
    } else if e.is_connect() {
        ClientError::NetworkUnreachable {
            hostname,
            attempts: 1,
        }
    } else {
        ClientError::Request(e)
    }
}

async fn server_error(status: u16, response: reqwest::Response) -> ClientError {
    let hostname = response
        .url()
        .host_str()
        .unwrap_or_default()
        .to_string();
    let message = response.text().await.unwrap_or_default();
    ClientError::ServerError {
        hostname,
        status,
        attempts: 1,
        message,
    }
}
