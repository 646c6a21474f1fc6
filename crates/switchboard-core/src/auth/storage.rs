use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::provider::ProviderId;
use crate::error::Result;
use crate::storage::{KeyValueStore, PersistedCell, keys, read_document};
use crate::subscription::Subscription;

/// Provider id → API key. A missing entry means no key was provided.
pub type Credentials = BTreeMap<String, String>;

/// Persisted API keys, stored as one JSON object under `apiKeys`.
pub struct CredentialStore {
    cell: PersistedCell<Credentials>,
}

impl CredentialStore {
    /// Read the persisted mapping once. Absent or corrupt data yields an
    /// empty mapping.
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let credentials: Credentials = read_document(backend.as_ref(), keys::API_KEYS)
            .await?
            .unwrap_or_default();
        debug!(
            target: "auth::storage",
            count = credentials.len(),
            "Loaded credentials"
        );
        Ok(Self {
            cell: PersistedCell::new(keys::API_KEYS, backend, credentials),
        })
    }

    pub fn get(&self) -> Credentials {
        self.cell.get()
    }

    pub fn api_key(&self, provider: &ProviderId) -> Option<String> {
        self.cell.read(|c| c.get(provider.as_str()).cloned())
    }

    /// Merge `{provider: api_key}` into the mapping and persist all of it.
    pub async fn set(&self, provider: &ProviderId, api_key: impl Into<String>) -> Result<()> {
        let api_key = api_key.into();
        self.cell
            .update(|credentials| {
                credentials.insert(provider.as_str().to_string(), api_key);
                Some(())
            })
            .await?;
        info!(target: "auth::storage", provider = %provider, "Stored API key");
        Ok(())
    }

    /// Drop the key for `provider`. Returns whether one was present.
    pub async fn remove(&self, provider: &ProviderId) -> Result<bool> {
        let removed = self
            .cell
            .update(|credentials| credentials.remove(provider.as_str()).map(|_| ()))
            .await?
            .is_some();
        if removed {
            info!(target: "auth::storage", provider = %provider, "Removed API key");
        }
        Ok(removed)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Credentials) + Send + Sync + 'static,
    {
        self.cell.subscribe(callback)
    }
}
