//! Persistence tests for the certificate trust store.
//!
//! These exercise the store against the in-memory secret store: pins
//! created on first use must survive a reload, and revocation must be
//! durable too.

use aria_core::{MemorySecretStore, SecretStore};
use aria_trust::{TrustDecision, TrustStore};
use std::sync::Arc;
use std::time::Duration;

/// Poll the persisted pin list until `predicate` holds, bounded by a
/// timeout so a broken flush fails the test instead of hanging it.
async fn wait_for_persisted<F>(secrets: &MemorySecretStore, predicate: F)
where
    F: Fn(Option<&str>) -> bool,
{
    for _ in 0..100 {
        let raw = secrets.get("trust.pins").await.unwrap();
        if predicate(raw.as_deref()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("persist task did not flush within 1s");
}

#[tokio::test]
async fn test_pin_survives_reload() {
    let secrets = Arc::new(MemorySecretStore::new());

    let trust = TrustStore::load(secrets.clone()).await.unwrap();
    assert_eq!(
        trust.evaluate("media.example.com", "digest-a"),
        TrustDecision::TrustOnFirstUse
    );

    wait_for_persisted(&secrets, |raw| {
        raw.is_some_and(|r| r.contains("media.example.com"))
    })
    .await;

    // A fresh store sees the pinned key and rejects a different one
    let reloaded = TrustStore::load(secrets).await.unwrap();
    assert_eq!(
        reloaded.evaluate("media.example.com", "digest-a"),
        TrustDecision::PinnedMatch
    );
    assert_eq!(
        reloaded.evaluate("media.example.com", "digest-b"),
        TrustDecision::Mismatch
    );
}

#[tokio::test]
async fn test_revoke_is_durable() {
    let secrets = Arc::new(MemorySecretStore::new());

    let trust = TrustStore::load(secrets.clone()).await.unwrap();
    trust.evaluate("media.example.com", "digest-a");
    trust.revoke("media.example.com");

    wait_for_persisted(&secrets, |raw| {
        raw.is_some_and(|r| !r.contains("media.example.com"))
    })
    .await;

    let reloaded = TrustStore::load(secrets).await.unwrap();
    assert_eq!(
        reloaded.evaluate("media.example.com", "digest-b"),
        TrustDecision::TrustOnFirstUse
    );
}

#[tokio::test]
async fn test_clear_removes_every_pin() {
    let trust = TrustStore::in_memory();
    trust.evaluate("a.example.com", "digest-a");
    trust.evaluate("b.example.com", "digest-b");
    assert_eq!(trust.len(), 2);

    trust.clear();
    assert!(trust.is_empty());
}
