//! Cache of configured HTTP clients keyed by (server, token).

use crate::error::Result;
use aria_trust::{PinningVerifier, TrustStore};
use lru::LruCache;
use reqwest::Client;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Upper bound on cached clients; one server with a couple of token
/// rotations fits comfortably.
const CACHE_CAPACITY: usize = 8;

struct CachedClient {
    http: Client,
    last_used_at: Instant,
}

/// Maps a (server URL, access token) pair to a reusable HTTP client with
/// the pinning verifier installed.
///
/// The cache key is derived from the token itself, so a token rotation
/// automatically misses: stale entries are removed by the session
/// manager, never reused by accident.
pub struct ClientCache {
    clients: Mutex<LruCache<u64, CachedClient>>,
    /// Shared client for unauthenticated traffic (discovery probes,
    /// login, token exchange); pinned like everything else
    probe: Mutex<Option<Client>>,
    trust: Arc<TrustStore>,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl ClientCache {
    pub fn new(trust: Arc<TrustStore>, request_timeout: Duration, connect_timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            clients: Mutex::new(LruCache::new(capacity)),
            probe: Mutex::new(None),
            trust,
            request_timeout,
            connect_timeout,
        }
    }

    /// The client for unauthenticated calls. Not keyed by token; built
    /// once and reused for discovery, login, and refresh exchanges.
    pub fn probe_client(&self) -> Result<Client> {
        let mut probe = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(http) = probe.as_ref() {
            return Ok(http.clone());
        }
        let http = self.build_client()?;
        *probe = Some(http.clone());
        Ok(http)
    }

    /// Get the cached client for this (server, token) pair, building one
    /// on first use.
    pub fn get_or_build(&self, server_url: &Url, access_token: &str) -> Result<Client> {
        let key = cache_key(server_url, access_token);

        {
            let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = clients.get_mut(&key) {
                cached.last_used_at = Instant::now();
                return Ok(cached.http.clone());
            }
        }

        let http = self.build_client()?;
        debug!(server = %server_url.host_str().unwrap_or_default(), "Built HTTP client");

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.put(
            key,
            CachedClient {
                http: http.clone(),
                last_used_at: Instant::now(),
            },
        );
        Ok(http)
    }

    /// Drop the entry for a stale token.
    pub fn invalidate(&self, server_url: &Url, access_token: &str) {
        let key = cache_key(server_url, access_token);
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(&key);
    }

    /// Drop every cached client, the probe client included (logout).
    pub fn clear(&self) {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.probe.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build_client(&self) -> Result<Client> {
        let tls = PinningVerifier::client_config(self.trust.clone());
        let http = Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(format!("AriaPlayer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(http)
    }
}

fn cache_key(server_url: &Url, access_token: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    server_url.as_str().hash(&mut hasher);
    access_token.hash(&mut hasher);
    hasher.finish()
}
