use std::path::Path;

use crate::config::provider::{ProviderConfig, ProviderId, builtin_providers, parse_providers};
use crate::error::{Error, Result};

const PROVIDERS_FILE: &str = "providers.toml";

/// Read-only registry of provider definitions.
///
/// Providers keep catalog order: built-ins first, in the order of the embedded
/// file, followed by any new ids introduced by the user's `providers.toml`.
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    providers: Vec<ProviderConfig>,
}

impl ProviderCatalog {
    /// Built-in providers only.
    pub fn builtin() -> Result<Self> {
        Ok(Self {
            providers: builtin_providers()?,
        })
    }

    /// Built-ins merged with `<config_dir>/switchboard/providers.toml`.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir();
        Self::load_with_config_dir(config_dir.as_deref())
    }

    /// Load provider definitions with an explicit config directory.
    ///
    /// If `config_dir` is None, only built-in providers are loaded. An entry
    /// whose id matches a built-in replaces it in place; new ids are appended.
    pub fn load_with_config_dir(config_dir: Option<&Path>) -> Result<Self> {
        let mut providers = builtin_providers()?;

        if let Some(cfg_dir) = config_dir {
            let path = cfg_dir.join("switchboard").join(PROVIDERS_FILE);
            if path.exists() {
                let contents = std::fs::read_to_string(&path)?;
                let overrides = parse_providers(&contents).map_err(|e| {
                    Error::Configuration(format!("Failed to parse {}: {e}", path.display()))
                })?;
                for p in overrides {
                    match providers.iter_mut().find(|existing| existing.id == p.id) {
                        Some(existing) => *existing = p,
                        None => providers.push(p),
                    }
                }
            }
        }

        Ok(Self { providers })
    }

    pub fn from_providers(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    pub fn list(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn get(&self, id: &ProviderId) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| &p.id == id)
    }

    /// Providers that can list models at runtime.
    pub fn dynamic(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.supports_dynamic_models())
    }
}
