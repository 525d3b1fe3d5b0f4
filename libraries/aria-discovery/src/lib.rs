//! Aria Player Endpoint Discovery
//!
//! Resolves a user-entered server address into a validated, reachable
//! base URL. The raw address expands into scheme/port permutations
//! (HTTPS and the well-known server ports first); candidates are probed
//! concurrently in small batches against the unauthenticated
//! `/api/info` identification endpoint, and the first candidate that
//! answers as an Aria server wins. Losing probes are cancelled as soon
//! as a winner is known.
//!
//! # Example
//!
//! ```ignore
//! use aria_discovery::{DiscoveryConfig, EndpointDiscoverer};
//! use aria_core::NetworkClass;
//! use tokio_util::sync::CancellationToken;
//!
//! let discoverer = EndpointDiscoverer::new(DiscoveryConfig::default(), NetworkClass::Unmetered)?;
//! let server = discoverer.discover("media.example.com", &CancellationToken::new()).await?;
//! println!("Found {} at {}", server.info.name, server.base_url);
//! ```

#![forbid(unsafe_code)]

mod candidate;
mod error;
mod prober;

pub use candidate::{
    expand_candidates, EndpointCandidate, WELL_KNOWN_HTTP_PORT, WELL_KNOWN_TLS_PORT,
};
pub use error::{DiscoveryError, Result};

use aria_core::{NetworkClass, RetryPolicy, ServerInfo};
use futures_util::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Tuning knobs for discovery.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    /// How many candidates are probed concurrently per batch (K)
    pub batch_size: usize,
    /// Budget for a single probe attempt on an unmetered network
    pub probe_timeout: Duration,
    /// Probe timeout multiplier applied on metered connections
    pub metered_multiplier: u32,
    /// Attempts per candidate before it is written off
    pub probe_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            probe_timeout: Duration::from_secs(3),
            metered_multiplier: 2,
            probe_attempts: 2,
        }
    }
}

impl DiscoveryConfig {
    /// The per-probe timeout after network-class scaling.
    pub fn effective_probe_timeout(&self, network: NetworkClass) -> Duration {
        if network.is_metered() {
            self.probe_timeout * self.metered_multiplier.max(1)
        } else {
            self.probe_timeout
        }
    }
}

/// A successfully discovered server.
#[derive(Debug, Clone)]
pub struct DiscoveredServer {
    /// Base URL the rest of the client should talk to
    pub base_url: Url,
    /// Identification payload the winning candidate answered with
    pub info: ServerInfo,
}

/// Resolves one raw address into a reachable Aria server base URL.
pub struct EndpointDiscoverer {
    http: Client,
    config: DiscoveryConfig,
    network: NetworkClass,
}

impl EndpointDiscoverer {
    /// Create a discoverer with its own plain HTTP client.
    ///
    /// Probes hit candidates whose trust state is not established yet, so
    /// this client performs standard TLS validation; pinning starts with
    /// the first authenticated connection.
    pub fn new(config: DiscoveryConfig, network: NetworkClass) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("AriaPlayer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, config, network))
    }

    /// Create a discoverer that probes through the given client (e.g. one
    /// with the pinning verifier already installed).
    pub fn with_client(http: Client, config: DiscoveryConfig, network: NetworkClass) -> Self {
        Self {
            http,
            config,
            network,
        }
    }

    /// Resolve a raw user-entered address to a reachable base URL.
    pub async fn discover(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<DiscoveredServer> {
        let candidates = expand_candidates(raw)?;
        debug!(raw = %raw, candidates = candidates.len(), "Expanded server address");
        self.discover_candidates(candidates, cancel).await
    }

    /// Probe an explicit candidate list in priority order.
    ///
    /// Candidates race in batches of `batch_size`; within a batch the
    /// first valid identification wins and the remaining in-flight probes
    /// are cancelled by dropping their futures.
    pub async fn discover_candidates(
        &self,
        candidates: Vec<EndpointCandidate>,
        cancel: &CancellationToken,
    ) -> Result<DiscoveredServer> {
        let attempted = candidates.len();
        let timeout = self.config.effective_probe_timeout(self.network);
        let policy = RetryPolicy {
            max_attempts: self.config.probe_attempts.max(1),
            ..RetryPolicy::default()
        };

        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            let mut probes: FuturesUnordered<_> = batch
                .iter()
                .map(|candidate| {
                    let url = candidate.url.clone();
                    let http = &self.http;
                    async move {
                        let outcome =
                            prober::probe_with_retry(http, &url, timeout, &policy).await;
                        (url, outcome)
                    }
                })
                .collect();

            loop {
                tokio::select! {
                    () = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                    next = probes.next() => match next {
                        Some((url, Ok(server_info))) => {
                            info!(url = %url, server = %server_info.name, version = %server_info.version, "Endpoint discovered");
                            return Ok(DiscoveredServer {
                                base_url: url,
                                info: server_info,
                            });
                        }
                        Some((url, Err(failure))) => {
                            debug!(url = %url, failure = ?failure, "Candidate rejected");
                        }
                        None => break,
                    }
                }
            }
        }

        Err(DiscoveryError::NoReachableEndpoint { attempted })
    }
}
