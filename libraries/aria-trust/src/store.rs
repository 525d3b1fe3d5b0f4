//! TOFU trust store: per-hostname pin state machine and persistence.

use crate::error::Result;
use crate::pin::Pin;
use aria_core::SecretStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Key under which pins are persisted in the secret store.
const PINS_KEY: &str = "trust.pins";

/// Outcome of evaluating a presented certificate against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Hostname is pinned and the presented key matches
    PinnedMatch,
    /// First contact with this hostname; the key was pinned and the
    /// connection is allowed
    TrustOnFirstUse,
    /// Hostname is pinned and the presented key differs; the connection
    /// must be rejected
    Mismatch,
}

enum PersistEvent {
    PinAdded(Pin),
    Revoked(String),
    Cleared,
}

/// Certificate trust store.
///
/// Per-hostname state machine: Unknown -> Pinned on the first validated
/// handshake, then Pinned forever until an explicit user-initiated
/// [`revoke`](Self::revoke). Evaluation is synchronous because the TLS
/// verifier callback cannot await; new pins are flushed to the secret
/// store by a background task fed through a channel.
pub struct TrustStore {
    pins: RwLock<HashMap<String, Pin>>,
    /// Hostnames whose last handshake failed the pin check. The request
    /// layer drains this to map opaque connect errors onto
    /// `CertificatePinMismatch`.
    violations: Mutex<HashSet<String>>,
    persist_tx: Option<mpsc::UnboundedSender<PersistEvent>>,
}

impl TrustStore {
    /// An ephemeral store with no persistence (tests, incognito sessions).
    pub fn in_memory() -> Self {
        Self {
            pins: RwLock::new(HashMap::new()),
            violations: Mutex::new(HashSet::new()),
            persist_tx: None,
        }
    }

    /// Load pins from the secret store and spawn the persistence task.
    pub async fn load(store: Arc<dyn SecretStore>) -> Result<Self> {
        let pins: HashMap<String, Pin> = match store.get(PINS_KEY).await? {
            Some(raw) => {
                let list: Vec<Pin> = serde_json::from_str(&raw)
                    .map_err(aria_core::CoreError::Serialization)?;
                list.into_iter().map(|p| (p.hostname.clone(), p)).collect()
            }
            None => HashMap::new(),
        };

        debug!(count = pins.len(), "Loaded certificate pins");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_loop(store, pins.clone(), rx));

        Ok(Self {
            pins: RwLock::new(pins),
            violations: Mutex::new(HashSet::new()),
            persist_tx: Some(tx),
        })
    }

    /// Evaluate a presented public-key digest for a hostname.
    ///
    /// Unknown hostnames are pinned on the spot (TOFU). A mismatch is
    /// recorded so the request layer can classify the resulting
    /// connection failure precisely.
    pub fn evaluate(&self, hostname: &str, spki_sha256: &str) -> TrustDecision {
        // Fast path: pinned hostnames only need the read lock
        {
            let pins = self.pins.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(pin) = pins.get(hostname) {
                return self.check_pinned(hostname, pin, spki_sha256);
            }
        }

        let mut pins = self.pins.write().unwrap_or_else(PoisonError::into_inner);
        // Another handshake may have pinned between the locks
        if let Some(existing) = pins.get(hostname).cloned() {
            drop(pins);
            return self.check_pinned(hostname, &existing, spki_sha256);
        }

        let pin = Pin::new(hostname, spki_sha256);
        info!(hostname = %hostname, "Pinning server certificate on first use");
        if let Some(tx) = &self.persist_tx {
            let _ = tx.send(PersistEvent::PinAdded(pin.clone()));
        }
        pins.insert(hostname.to_string(), pin);
        TrustDecision::TrustOnFirstUse
    }

    fn check_pinned(&self, hostname: &str, pin: &Pin, spki_sha256: &str) -> TrustDecision {
        if pin.matches(spki_sha256) {
            return TrustDecision::PinnedMatch;
        }
        warn!(
            hostname = %hostname,
            pinned_at = %pin.first_seen_at,
            "Certificate public key does not match stored pin"
        );
        self.record_violation(hostname);
        TrustDecision::Mismatch
    }

    /// The stored pin for a hostname, if any.
    pub fn pin_for(&self, hostname: &str) -> Option<Pin> {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hostname)
            .cloned()
    }

    /// Number of stored pins.
    pub fn len(&self) -> usize {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the pin for a hostname. Explicit user action only; there is
    /// no automatic rotation path.
    pub fn revoke(&self, hostname: &str) {
        let removed = self
            .pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(hostname)
            .is_some();

        if removed {
            info!(hostname = %hostname, "Revoked certificate pin");
            if let Some(tx) = &self.persist_tx {
                let _ = tx.send(PersistEvent::Revoked(hostname.to_string()));
            }
        }
    }

    /// Remove every stored pin.
    pub fn clear(&self) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Some(tx) = &self.persist_tx {
            let _ = tx.send(PersistEvent::Cleared);
        }
    }

    /// Check and clear the mismatch flag for a hostname.
    ///
    /// Returns true when the most recent handshake for this hostname was
    /// rejected by the pin check.
    pub fn take_violation(&self, hostname: &str) -> bool {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(hostname)
    }

    fn record_violation(&self, hostname: &str) {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hostname.to_string());
    }
}

/// Drains persist events and rewrites the stored pin list.
async fn persist_loop(
    store: Arc<dyn SecretStore>,
    mut pins: HashMap<String, Pin>,
    mut rx: mpsc::UnboundedReceiver<PersistEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            PersistEvent::PinAdded(pin) => {
                pins.insert(pin.hostname.clone(), pin);
            }
            PersistEvent::Revoked(hostname) => {
                pins.remove(&hostname);
            }
            PersistEvent::Cleared => pins.clear(),
        }

        let list: Vec<&Pin> = pins.values().collect();
        let serialized = match serde_json::to_string(&list) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to serialize certificate pins");
                continue;
            }
        };

        if let Err(e) = store.put(PINS_KEY, &serialized).await {
            warn!(error = %e, "Failed to persist certificate pins");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_pins_then_matches() {
        let store = TrustStore::in_memory();

        assert_eq!(
            store.evaluate("media.example.com", "digest-a"),
            TrustDecision::TrustOnFirstUse
        );
        assert_eq!(
            store.evaluate("media.example.com", "digest-a"),
            TrustDecision::PinnedMatch
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mismatch_is_rejected_and_recorded() {
        let store = TrustStore::in_memory();
        store.evaluate("media.example.com", "digest-a");

        assert_eq!(
            store.evaluate("media.example.com", "digest-b"),
            TrustDecision::Mismatch
        );
        assert!(store.take_violation("media.example.com"));
        // Drained after the first read
        assert!(!store.take_violation("media.example.com"));

        // The original pin is untouched by the mismatch
        assert_eq!(
            store.pin_for("media.example.com").unwrap().spki_sha256,
            "digest-a"
        );
    }

    #[test]
    fn test_revoke_returns_hostname_to_unknown() {
        let store = TrustStore::in_memory();
        store.evaluate("media.example.com", "digest-a");

        store.revoke("media.example.com");

        // Next contact is first-use again, even with a different key
        assert_eq!(
            store.evaluate("media.example.com", "digest-b"),
            TrustDecision::TrustOnFirstUse
        );
    }

    #[test]
    fn test_hostnames_are_independent() {
        let store = TrustStore::in_memory();
        store.evaluate("a.example.com", "digest-a");

        assert_eq!(
            store.evaluate("b.example.com", "digest-b"),
            TrustDecision::TrustOnFirstUse
        );
        assert_eq!(store.len(), 2);
    }
}
