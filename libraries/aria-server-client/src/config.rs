//! Client configuration: retry, refresh, discovery, and trust knobs.

use crate::error::{ClientError, Result};
use aria_core::{NetworkClass, RetryPolicy, SecretStore};
use aria_discovery::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Key under which configuration overrides are persisted.
const CONFIG_KEY: &str = "config.overrides";

/// Configuration for the server client.
///
/// Every field has a sensible default; overrides come from an optional
/// `aria.toml`, `ARIA_`-prefixed environment variables, or a JSON blob in
/// the secret store (in ascending precedence of whichever loader is
/// used). Durations are carried as integer milliseconds so the whole
/// struct stays trivially (de)serializable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Retry policy for request dispatch
    pub retry: RetryPolicy,

    /// Fraction of the token validity window after which a proactive
    /// refresh is triggered. Must be within (0, 1).
    pub refresh_lead_fraction: f64,
    /// Budget for one token-exchange call
    pub refresh_timeout_ms: u64,

    /// Per-request timeout for normal dispatch
    pub request_timeout_ms: u64,
    /// Connect timeout for new connections
    pub connect_timeout_ms: u64,

    /// Per-probe timeout for discovery (unmetered baseline)
    pub probe_timeout_ms: u64,
    /// Probe timeout multiplier on metered networks
    pub metered_multiplier: u32,
    /// Discovery concurrency (batch size K)
    pub discovery_batch_size: usize,
    /// Attempts per discovery candidate
    pub probe_attempts: u32,

    /// Network class reported by the host platform
    pub network: NetworkClass,

    /// Also remove the server's certificate pin on logout
    pub forget_pins_on_logout: bool,

    /// Human-readable device name sent to the server at login
    pub device_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            refresh_lead_fraction: 0.8,
            refresh_timeout_ms: 15_000,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            probe_timeout_ms: 3_000,
            metered_multiplier: 2,
            discovery_batch_size: 4,
            probe_attempts: 2,
            network: NetworkClass::Unmetered,
            forget_pins_on_logout: false,
            device_name: "Aria Player".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder();

        // Load from config file if it exists
        let config_path = std::path::PathBuf::from("aria.toml");
        if config_path.exists() {
            settings = settings.add_source(config::File::from(config_path));
        }

        // Override with environment variables (prefixed with ARIA_)
        settings = settings.add_source(
            config::Environment::with_prefix("ARIA")
                .separator("_")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration overrides persisted in the secret store,
    /// falling back to defaults for anything absent.
    pub async fn load_from_store(store: &dyn SecretStore) -> Result<Self> {
        let loaded = match store.get(CONFIG_KEY).await? {
            Some(raw) => {
                debug!("Applying persisted configuration overrides");
                serde_json::from_str(&raw)
                    .map_err(|e| ClientError::Parse(format!("stored config: {e}")))?
            }
            None => Self::default(),
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Persist this configuration as the stored override set.
    pub async fn persist(&self, store: &dyn SecretStore) -> Result<()> {
        let raw = serde_json::to_string(self)
            .map_err(|e| ClientError::Parse(format!("config serialize: {e}")))?;
        store.put(CONFIG_KEY, &raw).await?;
        Ok(())
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.refresh_lead_fraction > 0.0 && self.refresh_lead_fraction < 1.0) {
            return Err(ClientError::Parse(format!(
                "refresh_lead_fraction must be within (0, 1), got {}",
                self.refresh_lead_fraction
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ClientError::Parse(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.discovery_batch_size == 0 {
            return Err(ClientError::Parse(
                "discovery_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The discovery view of this configuration.
    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            batch_size: self.discovery_batch_size,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            metered_multiplier: self.metered_multiplier,
            probe_attempts: self.probe_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::MemorySecretStore;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lead_fraction_bounds_enforced() {
        let mut config = ClientConfig::default();
        config.refresh_lead_fraction = 1.0;
        assert!(config.validate().is_err());
        config.refresh_lead_fraction = 0.0;
        assert!(config.validate().is_err());
        config.refresh_lead_fraction = 0.5;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_partial_store_overrides_fall_back_to_defaults() {
        let store = MemorySecretStore::new();
        store
            .put(
                "config.overrides",
                r#"{"discovery_batch_size": 2, "metered_multiplier": 3}"#,
            )
            .await
            .unwrap();

        let config = ClientConfig::load_from_store(&store).await.unwrap();
        assert_eq!(config.discovery_batch_size, 2);
        assert_eq!(config.metered_multiplier, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.refresh_lead_fraction, 0.8);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_missing_store_key_yields_defaults() {
        let store = MemorySecretStore::new();
        let config = ClientConfig::load_from_store(&store).await.unwrap();
        assert_eq!(config.discovery_batch_size, 4);
    }
}
