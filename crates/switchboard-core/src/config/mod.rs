use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;

use crate::error::{Error, Result};
use crate::storage::{FileStore, KeyValueStore, SqliteStore};

pub mod model;
pub mod provider;

const APP_DIR: &str = "switchboard";
const CONFIG_FILE: &str = "config.toml";
const SQLITE_FILE: &str = "switchboard.db";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory (file backend) or database file (sqlite backend).
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base system instructions placed ahead of the tool context.
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// Directory holding `config.toml` and `providers.toml`.
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| Error::Configuration("Could not determine config directory".to_string()))?;
    Ok(dir.join(APP_DIR))
}

/// Directory holding persisted stores when no explicit storage path is configured.
pub fn data_dir() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .ok_or_else(|| Error::Configuration("Could not determine data directory".to_string()))?;
    Ok(dir.join(APP_DIR))
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        Ok(config_dir()?.join(CONFIG_FILE))
    }

    /// Load the config file, or defaults if it is missing or unparsable.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config file at {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {e}")))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Resolved location of the persisted stores for the configured backend.
    pub fn storage_location(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }
        let dir = data_dir()?;
        Ok(match self.storage.backend {
            StorageBackend::File => dir,
            StorageBackend::Sqlite => dir.join(SQLITE_FILE),
        })
    }

    /// Open the configured backing store.
    pub async fn open_storage(&self) -> Result<Arc<dyn KeyValueStore>> {
        let location = self.storage_location()?;
        tracing::debug!(
            backend = %self.storage.backend,
            location = %location.display(),
            "Opening storage"
        );
        let store: Arc<dyn KeyValueStore> = match self.storage.backend {
            StorageBackend::File => Arc::new(FileStore::new(location)),
            StorageBackend::Sqlite => Arc::new(SqliteStore::new(&location).await?),
        };
        Ok(store)
    }
}

/// Source of environment variables, swappable in tests.
pub trait EnvProvider: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StdEnvProvider;

impl EnvProvider for StdEnvProvider {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}
