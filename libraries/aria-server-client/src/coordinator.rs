//! Request execution with transparent auth recovery and retry.
//!
//! Every authenticated call goes through [`AuthCoordinator::execute`]: it
//! attaches the current token, dispatches through the cached client, and
//! reacts to failures by class. A 401 triggers the shared single-flight
//! refresh and exactly one re-dispatch; transient failures are re-
//! dispatched per the retry policy; everything else surfaces classified.

use crate::client_cache::ClientCache;
use crate::error::{ClientError, Result};
use crate::session::{RefreshReason, SessionManager};
use aria_core::{DeviceId, FailureKind, RetryPolicy};
use aria_trust::TrustStore;
use reqwest::{Method, Response};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// A rebuildable request descriptor.
///
/// Requests are described, not pre-built, so the coordinator can
/// re-dispatch them after a token refresh or a backoff delay.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Server-relative path, e.g. `/api/library/tracks`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-call-site override of the retry budget
    pub max_attempts: Option<u32>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            max_attempts: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Cap dispatch attempts for this request only (e.g. 1 for calls
    /// that must not be retried).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }
}

enum DispatchFailure {
    /// Server answered with a non-success, non-401 status
    Status(Response),
    /// The request never produced a response
    Transport(FailureKind),
}

/// Wraps request dispatch with auth recovery and failure-class retry.
pub(crate) struct AuthCoordinator {
    session: Arc<SessionManager>,
    cache: Arc<ClientCache>,
    trust: Arc<TrustStore>,
    policy: RetryPolicy,
    device_id: DeviceId,
}

impl AuthCoordinator {
    pub(crate) fn new(
        session: Arc<SessionManager>,
        cache: Arc<ClientCache>,
        trust: Arc<TrustStore>,
        policy: RetryPolicy,
        device_id: DeviceId,
    ) -> Self {
        Self {
            session,
            cache,
            trust,
            policy,
            device_id,
        }
    }

    /// Execute a request against the current session.
    pub(crate) async fn execute(&self, request: &ApiRequest) -> Result<Response> {
        let cancel = self.session.cancel_token();
        let max_attempts = request.max_attempts.unwrap_or(self.policy.max_attempts);
        let mut attempt: u32 = 0;
        let mut auth_retried = false;

        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            // Fails fast with AuthExpired when the session is terminal
            let (base_url, token) = self.session.current_token().await?;
            let hostname = base_url.host_str().unwrap_or_default().to_string();
            let http = self.cache.get_or_build(&base_url, &token)?;

            let url = join_url(&base_url, &request.path)?;
            let mut builder = http
                .request(request.method.clone(), url)
                .bearer_auth(&token)
                .header("X-Aria-Device", self.device_id.as_str());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let sent = tokio::select! {
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = builder.send() => result,
            };

            let failure = match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status().as_u16() == 401 => {
                    if auth_retried {
                        // A freshly refreshed token was rejected too;
                        // one auth retry is the hard limit
                        warn!(host = %hostname, "Fresh token rejected, surfacing auth expiry");
                        return Err(ClientError::AuthExpired);
                    }
                    auth_retried = true;
                    debug!(host = %hostname, "Received 401, refreshing token");
                    self.session
                        .refresh(RefreshReason::Reactive, Some(&token))
                        .await?;
                    continue;
                }
                Ok(response) => DispatchFailure::Status(response),
                Err(e) => {
                    if self.trust.take_violation(&hostname) {
                        return Err(ClientError::CertificatePinMismatch { hostname });
                    }
                    DispatchFailure::Transport(map_transport_error(&e))
                }
            };

            let (kind, response) = match failure {
                DispatchFailure::Status(response) => (
                    FailureKind::Status(response.status().as_u16()),
                    Some(response),
                ),
                DispatchFailure::Transport(kind) => (kind, None),
            };

            let class = RetryPolicy::classify(kind);
            if class.is_retryable() && attempt + 1 < max_attempts {
                let delay = self.policy.backoff(attempt, kind);
                debug!(
                    host = %hostname,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = ?kind,
                    "Retrying after transient failure"
                );
                // Scheduled continuation: the worker is released while
                // the delay elapses
                tokio::select! {
                    () = cancel.cancelled() => return Err(ClientError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
                continue;
            }

            return Err(surface(kind, response, hostname, attempt + 1).await);
        }
    }
}

/// Map an exhausted or non-retryable failure onto the error taxonomy.
async fn surface(
    kind: FailureKind,
    response: Option<Response>,
    hostname: String,
    attempts: u32,
) -> ClientError {
    match kind {
        FailureKind::TimedOut => ClientError::Timeout { hostname, attempts },
        FailureKind::ConnectFailed | FailureKind::DnsFailed => {
            ClientError::NetworkUnreachable { hostname, attempts }
        }
        FailureKind::Status(status @ (429 | 503)) => ClientError::ServerBusy {
            hostname,
            status,
            attempts,
        },
        FailureKind::Status(status) => {
            let message = match response {
                Some(r) => r.text().await.unwrap_or_default(),
                None => String::new(),
            };
            ClientError::ServerError {
                hostname,
                status,
                attempts,
                message,
            }
        }
    }
}

fn map_transport_error(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::TimedOut
    } else if e.is_connect() {
        // hyper reports resolver failures as connect errors; the message
        // is the only way to tell them apart
        if format!("{e:?}").contains("dns error") {
            FailureKind::DnsFailed
        } else {
            FailureKind::ConnectFailed
        }
    } else {
        FailureKind::ConnectFailed
    }
}

fn join_url(base_url: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ClientError::InvalidUrl(format!("{joined}: {e}")))
}
