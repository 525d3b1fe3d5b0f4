//! Session state machine and single-flight token refresh.
//!
//! One `SessionManager` owns the authenticated session for one server
//! identity. Any number of concurrent requests may observe an expired
//! token at once; the pending-refresh slot guarantees exactly one token
//! exchange reaches the server per failure episode, with every caller
//! sharing that one outcome.

use crate::auth::AuthClient;
use crate::client_cache::ClientCache;
use crate::error::{ClientError, Result};
use crate::types::{LoginResponse, PersistedSession};
use aria_core::{SecretStore, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Key under which the session is persisted in the secret store.
const SESSION_KEY: &str = "session";

/// Refresh lifecycle of the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Token is usable as far as we know
    Idle,
    /// A refresh is in flight; new callers attach to it
    Refreshing,
    /// Refresh was rejected; only a new login recovers
    Failed,
}

/// Why a refresh was requested. Diagnostic only; both paths share the
/// same single-flight machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// A request observed a 401
    Reactive,
    /// The validity window is nearly consumed
    Proactive,
}

impl RefreshReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Reactive => "reactive",
            Self::Proactive => "proactive",
        }
    }
}

/// The authenticated session for one server identity.
#[derive(Debug, Clone)]
pub(crate) struct ServerSession {
    pub server_url: Url,
    pub user_id: UserId,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Monotonic issue time, used for expiry math
    pub token_issued_at: Instant,
    /// Wall-clock issue time, used for persistence
    pub issued_at_wall: DateTime<Utc>,
    pub token_validity: Duration,
}

impl ServerSession {
    pub(crate) fn from_login(server_url: Url, login: &LoginResponse) -> Self {
        Self {
            server_url,
            user_id: UserId::new(login.user_id.clone()),
            username: login.username.clone(),
            access_token: login.access_token.clone(),
            refresh_token: login.refresh_token.clone(),
            token_issued_at: Instant::now(),
            issued_at_wall: Utc::now(),
            token_validity: Duration::from_secs(login.expires_in),
        }
    }

    pub(crate) fn from_persisted(persisted: &PersistedSession) -> Result<Self> {
        let server_url = Url::parse(&persisted.server_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", persisted.server_url)))?;

        // Recover how much of the validity window has already elapsed
        let elapsed = (Utc::now() - persisted.token_issued_at)
            .to_std()
            .unwrap_or_default();
        let token_issued_at = Instant::now().checked_sub(elapsed).unwrap_or_else(Instant::now);

        Ok(Self {
            server_url,
            user_id: persisted.user_id.clone(),
            username: persisted.username.clone(),
            access_token: persisted.access_token.clone(),
            refresh_token: persisted.refresh_token.clone(),
            token_issued_at,
            issued_at_wall: persisted.token_issued_at,
            token_validity: Duration::from_secs(persisted.token_validity_secs),
        })
    }

    fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            server_url: self.server_url.to_string(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_issued_at: self.issued_at_wall,
            token_validity_secs: self.token_validity.as_secs(),
        }
    }
}

/// Shared outcome of one refresh episode.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(String),
    Failed,
    Cancelled,
}

type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

struct SessionInner {
    session: Option<ServerSession>,
    refresh_state: RefreshState,
    /// The pending-refresh slot. `Some` exactly while `refresh_state`
    /// is `Refreshing`; concurrent callers clone this receiver instead
    /// of starting their own exchange.
    pending: Option<OutcomeReceiver>,
    /// Bumped on install/logout so a refresh task from a previous
    /// session can never mutate the current one.
    epoch: u64,
}

/// Owns the session state machine and the single-flight refresh.
pub struct SessionManager {
    inner: Mutex<SessionInner>,
    cache: Arc<ClientCache>,
    secrets: Arc<dyn SecretStore>,
    cancel: std::sync::Mutex<CancellationToken>,
    refresh_timeout: Duration,
    lead_fraction: f64,
}

impl SessionManager {
    pub(crate) fn new(
        cache: Arc<ClientCache>,
        secrets: Arc<dyn SecretStore>,
        refresh_timeout: Duration,
        lead_fraction: f64,
    ) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                session: None,
                refresh_state: RefreshState::Idle,
                pending: None,
                epoch: 0,
            }),
            cache,
            secrets,
            cancel: std::sync::Mutex::new(CancellationToken::new()),
            refresh_timeout,
            lead_fraction,
        }
    }

    /// The cancellation scope of the current session.
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Open a fresh cancellation scope for a new login attempt.
    ///
    /// Called before discovery so that connection setup runs under a
    /// token that `logout` can still cancel, while a token cancelled by
    /// a *previous* logout does not poison the new attempt. Any scope
    /// still open (a session being replaced) is cancelled first, which
    /// also stops its proactive refresh task.
    pub(crate) fn begin_scope(&self) -> CancellationToken {
        let mut guard = self
            .cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.cancel();
        let fresh = CancellationToken::new();
        *guard = fresh.clone();
        fresh
    }

    /// Install a fresh session (login or restore) and start the
    /// proactive refresh task for it.
    pub(crate) async fn install(self: &Arc<Self>, session: ServerSession) {
        {
            let mut inner = self.inner.lock().await;
            inner.session = Some(session);
            inner.refresh_state = RefreshState::Idle;
            inner.pending = None;
            inner.epoch += 1;
        }

        self.persist_current().await;
        self.spawn_proactive(self.cancel_token());
    }

    /// Base URL and access token for dispatching a request.
    ///
    /// Fails fast with `AuthExpired` when the session is absent or the
    /// refresh state is terminal.
    pub(crate) async fn current_token(&self) -> Result<(Url, String)> {
        let inner = self.inner.lock().await;
        if inner.refresh_state == RefreshState::Failed {
            return Err(ClientError::AuthExpired);
        }
        match &inner.session {
            Some(session) => Ok((session.server_url.clone(), session.access_token.clone())),
            None => Err(ClientError::AuthExpired),
        }
    }

    pub(crate) async fn refresh_state(&self) -> RefreshState {
        self.inner.lock().await.refresh_state
    }

    pub(crate) async fn username(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.username.clone())
    }

    /// Refresh the access token, sharing any refresh already in flight.
    ///
    /// Returns the new access token. Exactly one token exchange reaches
    /// the server per episode regardless of how many callers arrive
    /// while it runs. `stale_token` is the token the caller saw rejected:
    /// when it no longer matches the session, another caller's refresh
    /// already completed and the current token is returned as-is.
    pub(crate) async fn refresh(
        self: &Arc<Self>,
        reason: RefreshReason,
        stale_token: Option<&str>,
    ) -> Result<String> {
        let rx = {
            let mut inner = self.inner.lock().await;
            match inner.refresh_state {
                RefreshState::Failed => return Err(ClientError::AuthExpired),
                RefreshState::Refreshing => match inner.pending.clone() {
                    Some(rx) => rx,
                    // Unreachable by the slot invariant, but degrade to
                    // a terminal error rather than panicking
                    None => return Err(ClientError::AuthExpired),
                },
                RefreshState::Idle => {
                    if let (Some(stale), Some(session)) = (stale_token, inner.session.as_ref()) {
                        if session.access_token != stale {
                            // This caller lost the race; the episode it
                            // observed is already resolved
                            return Ok(session.access_token.clone());
                        }
                    }
                    let (server_url, refresh_token, old_token) = match inner.session.as_ref() {
                        Some(s) => (
                            s.server_url.clone(),
                            s.refresh_token.clone(),
                            s.access_token.clone(),
                        ),
                        None => return Err(ClientError::AuthExpired),
                    };

                    let (tx, rx) = watch::channel(None);
                    inner.pending = Some(rx.clone());
                    inner.refresh_state = RefreshState::Refreshing;
                    let epoch = inner.epoch;
                    debug!(reason = reason.as_str(), "Starting token refresh");

                    self.spawn_refresh_task(tx, server_url, refresh_token, old_token, epoch);
                    rx
                }
            }
        };

        let outcome = Self::await_outcome(rx).await;
        match outcome {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::Failed => Err(ClientError::AuthExpired),
            RefreshOutcome::Cancelled => Err(ClientError::Cancelled),
        }
    }

    async fn await_outcome(mut rx: OutcomeReceiver) -> RefreshOutcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender vanished without publishing; treat as cancelled
                return RefreshOutcome::Cancelled;
            }
        }
    }

    fn spawn_refresh_task(
        self: &Arc<Self>,
        tx: watch::Sender<Option<RefreshOutcome>>,
        base_url: Url,
        refresh_token: String,
        old_token: String,
        epoch: u64,
    ) {
        let manager = Arc::clone(self);
        let cancel = self.cancel_token();

        tokio::spawn(async move {
            let hostname = base_url.host_str().unwrap_or_default().to_string();

            let exchange = async {
                let http = manager.cache.probe_client()?;
                let base = base_url.as_str().trim_end_matches('/').to_string();
                let auth = AuthClient::new(&http, &base);
                let refreshed =
                    tokio::time::timeout(manager.refresh_timeout, auth.refresh(&refresh_token))
                        .await
                        .map_err(|_| ClientError::Timeout {
                            hostname: hostname.clone(),
                            attempts: 1,
                        })??;
                Ok::<_, ClientError>(refreshed)
            };

            let result = tokio::select! {
                () = cancel.cancelled() => Err(ClientError::Cancelled),
                r = exchange => r,
            };

            let outcome = {
                let mut inner = manager.inner.lock().await;
                if inner.epoch != epoch {
                    // Session was replaced while we were refreshing;
                    // the result belongs to nobody
                    RefreshOutcome::Cancelled
                } else {
                    match result {
                        Ok(refreshed) => {
                            if let Some(session) = inner.session.as_mut() {
                                session.access_token = refreshed.access_token.clone();
                                session.refresh_token = refreshed.refresh_token.clone();
                                session.token_issued_at = Instant::now();
                                session.issued_at_wall = Utc::now();
                                session.token_validity =
                                    Duration::from_secs(refreshed.expires_in);
                            }
                            inner.refresh_state = RefreshState::Idle;
                            inner.pending = None;
                            // The stale client entry must be gone before
                            // any waiter dispatches with the new token
                            manager.cache.invalidate(&base_url, &old_token);
                            info!("Access token refreshed");
                            RefreshOutcome::Refreshed(refreshed.access_token)
                        }
                        Err(ClientError::Cancelled) => {
                            inner.refresh_state = RefreshState::Idle;
                            inner.pending = None;
                            RefreshOutcome::Cancelled
                        }
                        Err(e) => {
                            warn!(error = %e, "Token refresh failed");
                            inner.refresh_state = RefreshState::Failed;
                            inner.pending = None;
                            manager.cache.invalidate(&base_url, &old_token);
                            RefreshOutcome::Failed
                        }
                    }
                }
            };

            let refreshed = matches!(outcome, RefreshOutcome::Refreshed(_));
            let _ = tx.send(Some(outcome));

            if refreshed {
                manager.persist_current().await;
            }
        });
    }

    /// Background task that renews the token before it expires.
    ///
    /// Wakes at `lead_fraction` of the validity window and goes through
    /// the same single-flight path as reactive refresh, so requests in
    /// flight at that moment simply share the outcome.
    fn spawn_proactive(self: &Arc<Self>, cancel: CancellationToken) {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let deadline = {
                    let inner = manager.inner.lock().await;
                    if inner.refresh_state == RefreshState::Failed {
                        return;
                    }
                    let Some(session) = &inner.session else { return };
                    session.token_issued_at
                        + session.token_validity.mul_f64(manager.lead_fraction)
                };

                if deadline > Instant::now() {
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                    }
                }

                match manager.refresh(RefreshReason::Proactive, None).await {
                    Ok(_) => {}
                    Err(ClientError::Cancelled) => return,
                    Err(e) => {
                        warn!(error = %e, "Proactive refresh failed, stopping renewal task");
                        return;
                    }
                }
            }
        });
    }

    /// Tear the session down.
    ///
    /// Cancels any pending refresh (waiters observe `Cancelled`), clears
    /// session state and every cached client, and removes the persisted
    /// session. Returns the server URL the session pointed at so the
    /// caller can optionally clear its certificate pin.
    pub(crate) async fn logout(&self) -> Option<Url> {
        self.cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .cancel();

        let server_url = {
            let mut inner = self.inner.lock().await;
            let url = inner.session.as_ref().map(|s| s.server_url.clone());
            inner.session = None;
            inner.refresh_state = RefreshState::Idle;
            inner.pending = None;
            inner.epoch += 1;
            url
        };

        self.cache.clear();

        if let Err(e) = self.secrets.delete(SESSION_KEY).await {
            warn!(error = %e, "Failed to remove persisted session");
        }

        info!("Logged out");
        server_url
    }

    /// Load a persisted session from the secret store, if any.
    pub(crate) async fn load_persisted(&self) -> Result<Option<PersistedSession>> {
        match self.secrets.get(SESSION_KEY).await? {
            Some(raw) => {
                let persisted = serde_json::from_str(&raw)
                    .map_err(|e| ClientError::Parse(format!("stored session: {e}")))?;
                Ok(Some(persisted))
            }
            None => Ok(None),
        }
    }

    async fn persist_current(&self) {
        let persisted = {
            let inner = self.inner.lock().await;
            inner.session.as_ref().map(ServerSession::to_persisted)
        };
        let Some(persisted) = persisted else { return };

        let raw = match serde_json::to_string(&persisted) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize session");
                return;
            }
        };

        if let Err(e) = self.secrets.put(SESSION_KEY, &raw).await {
            warn!(error = %e, "Failed to persist session");
        }
    }
}
