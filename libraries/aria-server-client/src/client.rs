//! Main Aria server client.

use crate::client_cache::ClientCache;
use crate::config::ClientConfig;
use crate::coordinator::{ApiRequest, AuthCoordinator};
use crate::error::Result;
use crate::session::{RefreshState, ServerSession, SessionManager};
use crate::types::{Credentials, LoginResponse, UserInfo};
use crate::ClientError;
use aria_core::{DeviceId, SecretStore, ServerInfo};
use aria_discovery::EndpointDiscoverer;
use aria_trust::TrustStore;
use reqwest::Response;
use std::sync::Arc;
use tracing::{debug, info};

/// Key under which the device identity is persisted.
const DEVICE_ID_KEY: &str = "device_id";

/// Client for one Aria server identity.
///
/// Owns the whole connection stack for that server: endpoint discovery,
/// certificate trust, the authenticated session, and failure-aware
/// request dispatch. Multiple servers mean multiple instances; nothing
/// here is process-global.
///
/// # Example
///
/// ```ignore
/// use aria_server_client::{ApiRequest, AriaServerClient, ClientConfig, Credentials};
/// use aria_core::MemorySecretStore;
/// use std::sync::Arc;
///
/// let secrets = Arc::new(MemorySecretStore::new());
/// let client = AriaServerClient::new(ClientConfig::default(), secrets).await?;
///
/// let login = client.login("media.example.com", &Credentials::new("user", "pass")).await?;
/// println!("Logged in as {}", login.username);
///
/// let tracks = client.execute(&ApiRequest::get("/api/library/tracks")).await?;
/// ```
pub struct AriaServerClient {
    config: ClientConfig,
    trust: Arc<TrustStore>,
    cache: Arc<ClientCache>,
    session: Arc<SessionManager>,
    coordinator: AuthCoordinator,
    device_id: DeviceId,
}

impl AriaServerClient {
    /// Create a client backed by the given secret store.
    ///
    /// Loads persisted certificate pins and the device identity; does not
    /// touch the network.
    pub async fn new(config: ClientConfig, secrets: Arc<dyn SecretStore>) -> Result<Self> {
        config.validate()?;

        let trust = Arc::new(TrustStore::load(secrets.clone()).await?);
        let cache = Arc::new(ClientCache::new(
            trust.clone(),
            config.request_timeout(),
            config.connect_timeout(),
        ));
        let session = Arc::new(SessionManager::new(
            cache.clone(),
            secrets.clone(),
            config.refresh_timeout(),
            config.refresh_lead_fraction,
        ));
        let device_id = load_or_create_device_id(secrets.as_ref()).await?;
        let coordinator = AuthCoordinator::new(
            session.clone(),
            cache.clone(),
            trust.clone(),
            config.retry,
            device_id.clone(),
        );

        Ok(Self {
            config,
            trust,
            cache,
            session,
            coordinator,
            device_id,
        })
    }

    /// Discover the server behind `address` and log in.
    ///
    /// Discovery and the credential exchange run through the pinned
    /// transport, so the first handshake already records the server's
    /// certificate pin.
    pub async fn login(&self, address: &str, credentials: &Credentials) -> Result<LoginResponse> {
        let cancel = self.session.begin_scope();

        let discoverer = EndpointDiscoverer::with_client(
            self.cache.probe_client()?,
            self.config.discovery(),
            self.config.network,
        );
        let discovered = discoverer.discover(address, &cancel).await?;
        debug!(url = %discovered.base_url, server = %discovered.info.name, "Logging in");

        let http = self.cache.probe_client()?;
        let base = discovered.base_url.as_str().trim_end_matches('/').to_string();
        let auth = crate::auth::AuthClient::new(&http, &base);
        let login = auth
            .login(credentials, self.device_id.as_str(), &self.config.device_name)
            .await?;

        let session = ServerSession::from_login(discovered.base_url, &login);
        self.session.install(session).await;

        Ok(login)
    }

    /// Resume the session persisted in the secret store, if any.
    ///
    /// Returns `false` when no session is stored. The persisted base URL
    /// is trusted as-is; it was validated by discovery when first
    /// established.
    pub async fn restore(&self) -> Result<bool> {
        match self.session.load_persisted().await? {
            Some(persisted) => {
                let session = ServerSession::from_persisted(&persisted)?;
                self.session.begin_scope();
                info!(username = %persisted.username, "Restored persisted session");
                self.session.install(session).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Execute an authenticated request against the server.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response> {
        self.coordinator.execute(request).await
    }

    /// Tear down the session: cancel in-flight refresh and discovery,
    /// clear tokens and cached clients, and forget the persisted
    /// session. Optionally removes the server's certificate pin.
    pub async fn logout(&self) {
        let server_url = self.session.logout().await;

        if self.config.forget_pins_on_logout {
            if let Some(host) = server_url.as_ref().and_then(|u| u.host_str()) {
                self.trust.revoke(host);
            }
        }
    }

    /// Whether a usable session is present.
    pub async fn is_authenticated(&self) -> bool {
        self.session.current_token().await.is_ok()
    }

    /// Unauthenticated identification round trip against `address`.
    ///
    /// Runs under its own cancellation scope: it is a standalone probe,
    /// not part of any session, so a previous logout does not affect it.
    pub async fn test_connection(&self, address: &str) -> Result<ServerInfo> {
        let discoverer = EndpointDiscoverer::with_client(
            self.cache.probe_client()?,
            self.config.discovery(),
            self.config.network,
        );
        let discovered = discoverer
            .discover(address, &tokio_util::sync::CancellationToken::new())
            .await?;
        Ok(discovered.info)
    }

    /// The user behind the current session, per the server.
    ///
    /// Goes through the coordinator, so an expired token is refreshed
    /// transparently first.
    pub async fn current_user(&self) -> Result<UserInfo> {
        let response = self.execute(&ApiRequest::get("/api/auth/me")).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Failed to parse user info: {e}")))
    }

    /// The username of the current session, if authenticated.
    pub async fn username(&self) -> Option<String> {
        self.session.username().await
    }

    /// Current refresh lifecycle state, for status surfaces.
    pub async fn refresh_state(&self) -> RefreshState {
        self.session.refresh_state().await
    }

    /// The certificate trust store, for pin management UI (listing and
    /// explicit revocation).
    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust
    }
}

async fn load_or_create_device_id(secrets: &dyn SecretStore) -> Result<DeviceId> {
    if let Some(stored) = secrets.get(DEVICE_ID_KEY).await? {
        return Ok(DeviceId::new(stored));
    }
    let generated = DeviceId::generate();
    secrets.put(DEVICE_ID_KEY, generated.as_str()).await?;
    debug!(device_id = %generated, "Generated device identity");
    Ok(generated)
}
