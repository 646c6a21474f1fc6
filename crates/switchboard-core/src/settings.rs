use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::provider::ProviderId;
use crate::error::Result;
use crate::storage::{KeyValueStore, PersistedCell, keys, read_document};
use crate::subscription::Subscription;

/// User-adjustable settings for one provider.
///
/// Fields this crate does not understand are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSetting {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            extra: serde_json::Map::new(),
        }
    }
}

pub type ProviderSettings = BTreeMap<String, ProviderSetting>;

/// Persisted per-provider settings under the `providers` key.
pub struct ProviderSettingsStore {
    cell: PersistedCell<ProviderSettings>,
}

impl ProviderSettingsStore {
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let settings: ProviderSettings = read_document(backend.as_ref(), keys::PROVIDERS)
            .await?
            .unwrap_or_default();
        debug!(target: "settings", count = settings.len(), "Loaded provider settings");
        Ok(Self {
            cell: PersistedCell::new(keys::PROVIDERS, backend, settings),
        })
    }

    pub fn get(&self) -> ProviderSettings {
        self.cell.get()
    }

    /// Settings for `provider`, or the defaults when none are stored.
    pub fn setting(&self, provider: &ProviderId) -> ProviderSetting {
        self.cell
            .read(|s| s.get(provider.as_str()).cloned())
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, provider: &ProviderId) -> bool {
        self.cell
            .read(|s| s.get(provider.as_str()).is_none_or(|p| p.enabled))
    }

    pub async fn set(&self, provider: &ProviderId, setting: ProviderSetting) -> Result<()> {
        self.cell
            .update(|settings| {
                if settings.get(provider.as_str()) == Some(&setting) {
                    return None;
                }
                settings.insert(provider.as_str().to_string(), setting);
                Some(())
            })
            .await?;
        info!(target: "settings", provider = %provider, "Updated provider settings");
        Ok(())
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProviderSettings) + Send + Sync + 'static,
    {
        self.cell.subscribe(callback)
    }
}
