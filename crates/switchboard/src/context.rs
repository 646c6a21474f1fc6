use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use switchboard_core::api::HttpModelFetcher;
use switchboard_core::catalog::ProviderCatalog;
use switchboard_core::config::Config;
use switchboard_core::config::provider::{ProviderConfig, ProviderId};
use switchboard_core::session::{ChatSessionController, SessionStores};
use switchboard_core::tools::ToolRegistry;

use crate::error::Error;

/// Everything a command needs: the loaded config and a session over the
/// persisted stores.
pub struct AppContext {
    pub config: Config,
    pub session: ChatSessionController,
}

impl AppContext {
    /// Load config from `config_path` (or the default location), then open
    /// storage, optionally redirected to `data_dir`.
    pub async fn load(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<Self, Error> {
        let mut config = match config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        if let Some(dir) = data_dir {
            config.storage.path = Some(dir.to_path_buf());
        }
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Result<Self, Error> {
        let backend = config.open_storage().await?;
        let catalog = Arc::new(ProviderCatalog::load()?);
        let tool_registry = Arc::new(ToolRegistry::builtin()?);
        let fetcher = HttpModelFetcher::new(config.http.timeout())
            .map_err(switchboard_core::error::Error::from)?;

        let stores = SessionStores::open(backend, catalog, tool_registry, Arc::new(fetcher)).await?;
        debug!(
            providers = stores.catalog.list().len(),
            tools = stores.tool_registry.list().len(),
            "Opened session stores"
        );

        let session = ChatSessionController::new(stores, config.system_prompt.clone());
        Ok(Self { config, session })
    }

    pub fn stores(&self) -> &SessionStores {
        self.session.stores()
    }

    /// Look up a provider by id, failing with the list of known ids.
    pub fn provider(&self, id: &str) -> Result<ProviderConfig, Error> {
        let catalog = &self.stores().catalog;
        catalog.get(&ProviderId::from(id)).cloned().ok_or_else(|| {
            let known: Vec<_> = catalog.list().iter().map(|p| p.id.as_str()).collect();
            Error::Config(format!(
                "Unknown provider '{id}'. Known providers: {}",
                known.join(", ")
            ))
        })
    }
}
