//! Storage trait for the encrypted key-value boundary

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Encrypted key-value store provided by the host application.
///
/// The connection core persists three things through this boundary: the
/// current session (never logged in plaintext), certificate pins, and
/// configuration overrides. Encryption at rest is the implementer's
/// responsibility; the core only sees opaque string values.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get a value by key, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value under a key, replacing any previous value
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key, ignoring absence
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory `SecretStore` for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| CoreError::store("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CoreError::store("memory store poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CoreError::store("memory store poisoned"))?;
        values.remove(key);
        Ok(())
    }
}
