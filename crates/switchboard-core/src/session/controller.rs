use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::agents::{Agent, AgentMetadata, AgentStore};
use crate::api::models::ModelFetcher;
use crate::auth::CredentialStore;
use crate::catalog::ProviderCatalog;
use crate::config::model::ModelInfo;
use crate::config::provider::{ProviderConfig, ProviderId};
use crate::error::{Error, Result};
use crate::model_registry::{LoadingScope, ModelRegistry, RefreshOutcome};
use crate::settings::{ProviderSetting, ProviderSettingsStore};
use crate::storage::KeyValueStore;
use crate::subscription::Subscription;
use crate::tools::{ToolEnablementStore, ToolRegistry};

use super::message::{ChatMessage, OutboundRequest};

/// The stores and registries a session is built from.
#[derive(Clone)]
pub struct SessionStores {
    pub catalog: Arc<ProviderCatalog>,
    pub credentials: Arc<CredentialStore>,
    pub settings: Arc<ProviderSettingsStore>,
    pub models: Arc<ModelRegistry>,
    pub tool_registry: Arc<ToolRegistry>,
    pub tools: Arc<ToolEnablementStore>,
    pub agents: Arc<AgentStore>,
}

impl SessionStores {
    /// Load every persisted store from `backend`.
    pub async fn open(
        backend: Arc<dyn KeyValueStore>,
        catalog: Arc<ProviderCatalog>,
        tool_registry: Arc<ToolRegistry>,
        fetcher: Arc<dyn ModelFetcher>,
    ) -> Result<Self> {
        let credentials = CredentialStore::load(backend.clone()).await?;
        let settings = ProviderSettingsStore::load(backend.clone()).await?;
        let tools = ToolEnablementStore::load(backend.clone(), tool_registry.clone()).await?;
        let agents = AgentStore::open(backend).await?;
        let models = ModelRegistry::new(catalog.clone(), fetcher);

        Ok(Self {
            catalog,
            credentials: Arc::new(credentials),
            settings: Arc::new(settings),
            models: Arc::new(models),
            tool_registry,
            tools: Arc::new(tools),
            agents: Arc::new(agents),
        })
    }

    /// Catalog providers not disabled in settings, in catalog order.
    pub fn available_providers(&self) -> Vec<ProviderConfig> {
        available_providers(&self.catalog, &self.settings)
    }
}

fn available_providers(
    catalog: &ProviderCatalog,
    settings: &ProviderSettingsStore,
) -> Vec<ProviderConfig> {
    catalog
        .list()
        .iter()
        .filter(|p| settings.is_enabled(&p.id))
        .cloned()
        .collect()
}

fn first_model_of(models: &[ModelInfo], provider: &ProviderId) -> Option<String> {
    models
        .iter()
        .find(|m| &m.provider == provider)
        .map(|m| m.name.clone())
}

/// The provider and model the user is talking to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
}

impl Selection {
    /// Keep the selection pointing at something that exists.
    ///
    /// An unavailable provider is replaced by the first available one and its
    /// first model. A model the provider no longer offers is replaced by the
    /// provider's first model. Returns whether anything changed.
    fn revalidate(&mut self, providers: &[ProviderConfig], models: &[ModelInfo]) -> bool {
        let before = self.clone();

        let provider_available = self
            .provider
            .as_ref()
            .is_some_and(|current| providers.iter().any(|p| &p.id == current));

        if provider_available {
            if let Some(provider) = &self.provider {
                let offered = self.model.as_ref().is_some_and(|name| {
                    models
                        .iter()
                        .any(|m| &m.provider == provider && &m.name == name)
                });
                if !offered {
                    self.model = first_model_of(models, provider);
                }
            }
        } else {
            self.provider = providers.first().map(|p| p.id.clone());
            self.model = self
                .provider
                .as_ref()
                .and_then(|p| first_model_of(models, p));
        }

        *self != before
    }
}

#[derive(Debug, Default)]
struct SessionState {
    selection: Selection,
    messages: Vec<ChatMessage>,
    title: Option<String>,
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn revalidate_shared(
    state: &SharedState,
    catalog: &ProviderCatalog,
    settings: &ProviderSettingsStore,
    models: &[ModelInfo],
) {
    let providers = available_providers(catalog, settings);
    let mut state = lock(state);
    if state.selection.revalidate(&providers, models) {
        info!(
            target: "session::controller",
            provider = ?state.selection.provider,
            model = ?state.selection.model,
            "Selection changed after provider or model list update"
        );
    }
}

/// Coordinates provider/model selection, the active conversation, and the
/// stores behind them for one chat session.
pub struct ChatSessionController {
    stores: SessionStores,
    system_prompt: Option<String>,
    state: SharedState,
    _subscriptions: Vec<Subscription>,
}

impl ChatSessionController {
    pub fn new(stores: SessionStores, system_prompt: Option<String>) -> Self {
        let state: SharedState = Arc::new(Mutex::new(SessionState::default()));
        revalidate_shared(
            &state,
            &stores.catalog,
            &stores.settings,
            &stores.models.current_models(),
        );

        let on_models = {
            let state = state.clone();
            let catalog = stores.catalog.clone();
            let settings = stores.settings.clone();
            stores.models.subscribe(move |list| {
                revalidate_shared(&state, &catalog, &settings, &list.models);
            })
        };

        let on_settings = {
            let state = state.clone();
            let catalog = stores.catalog.clone();
            let settings = Arc::downgrade(&stores.settings);
            let models = stores.models.clone();
            stores.settings.subscribe(move |_| {
                if let Some(settings) = settings.upgrade() {
                    revalidate_shared(&state, &catalog, &settings, &models.current_models());
                }
            })
        };

        Self {
            stores,
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            state,
            _subscriptions: vec![on_models, on_settings],
        }
    }

    pub fn stores(&self) -> &SessionStores {
        &self.stores
    }

    /// Fetch every provider's runtime models with the stored credentials.
    pub async fn initialize(&self) {
        let credentials = self.stores.credentials.get();
        let settings = self.stores.settings.get();
        self.stores.models.refresh_all(&credentials, &settings).await;
    }

    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.stores.available_providers()
    }

    /// Models of every available provider.
    pub fn models(&self) -> Vec<ModelInfo> {
        let providers = self.providers();
        self.stores
            .models
            .current_models()
            .into_iter()
            .filter(|m| providers.iter().any(|p| p.id == m.provider))
            .collect()
    }

    pub fn selection(&self) -> Selection {
        lock(&self.state).selection.clone()
    }

    /// Select `provider` and its first model.
    pub fn select_provider(&self, provider: &ProviderId) -> Result<()> {
        if !self.providers().iter().any(|p| &p.id == provider) {
            return Err(Error::NotFound(format!("Provider '{provider}' is not available")));
        }
        let model = first_model_of(&self.stores.models.current_models(), provider);

        let mut state = lock(&self.state);
        state.selection = Selection {
            provider: Some(provider.clone()),
            model,
        };
        debug!(target: "session::controller", provider = %provider, "Selected provider");
        Ok(())
    }

    /// Select a model offered by the current provider.
    pub fn select_model(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let provider = state
            .selection
            .provider
            .clone()
            .ok_or_else(|| Error::Validation("No provider selected".to_string()))?;

        let offered = self
            .stores
            .models
            .models_for(&provider)
            .iter()
            .any(|m| m.name == name);
        if !offered {
            return Err(Error::NotFound(format!(
                "Model '{name}' is not offered by {provider}"
            )));
        }

        state.selection.model = Some(name.to_string());
        debug!(target: "session::controller", provider = %provider, model = name, "Selected model");
        Ok(())
    }

    /// True while the model list for the selected provider may still change.
    pub fn is_model_loading(&self) -> bool {
        match self.stores.models.loading_scope() {
            Some(LoadingScope::All) => true,
            Some(LoadingScope::Provider(loading)) => {
                self.selection().provider.as_ref() == Some(&loading)
            }
            None => false,
        }
    }

    /// Store a key for `provider` and refresh that provider's models.
    pub async fn set_api_key(
        &self,
        provider: &ProviderId,
        api_key: impl Into<String>,
    ) -> Result<RefreshOutcome> {
        self.stores.credentials.set(provider, api_key).await?;
        Ok(self.refresh_provider(provider).await)
    }

    pub async fn remove_api_key(&self, provider: &ProviderId) -> Result<RefreshOutcome> {
        if !self.stores.credentials.remove(provider).await? {
            return Ok(RefreshOutcome::Skipped);
        }
        Ok(self.refresh_provider(provider).await)
    }

    /// Store settings for `provider`; refreshes its models if it is enabled.
    pub async fn set_provider_setting(
        &self,
        provider: &ProviderId,
        setting: ProviderSetting,
    ) -> Result<RefreshOutcome> {
        let enabled = setting.enabled;
        self.stores.settings.set(provider, setting).await?;
        if !enabled {
            return Ok(RefreshOutcome::Skipped);
        }
        Ok(self.refresh_provider(provider).await)
    }

    async fn refresh_provider(&self, provider: &ProviderId) -> RefreshOutcome {
        let credentials = self.stores.credentials.get();
        let settings = self.stores.settings.get();
        self.stores
            .models
            .refresh_one(provider, &credentials, &settings)
            .await
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.clone()
    }

    pub fn title(&self) -> Option<String> {
        lock(&self.state).title.clone()
    }

    pub fn push_message(&self, message: ChatMessage) {
        lock(&self.state).messages.push(message);
    }

    pub fn clear_messages(&self) {
        let mut state = lock(&self.state);
        state.messages.clear();
        state.title = None;
    }

    /// Base instructions followed by the enabled tools' context, separated by
    /// a blank line.
    pub fn system_context(&self) -> String {
        let tool_context = self.stores.tools.compose_context(&self.stores.tool_registry);
        [self.system_prompt.as_deref(), Some(tool_context.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn compose_request(&self) -> Result<OutboundRequest> {
        let (selection, messages) = {
            let state = lock(&self.state);
            (state.selection.clone(), state.messages.clone())
        };

        let provider = selection
            .provider
            .ok_or_else(|| Error::Validation("No provider selected".to_string()))?;
        let model = selection
            .model
            .ok_or_else(|| Error::Validation(format!("No model selected for {provider}")))?;

        Ok(OutboundRequest {
            provider,
            model,
            system: self.system_context(),
            messages,
        })
    }

    /// Save the current conversation as a new agent.
    pub async fn save_as_agent(
        &self,
        name: &str,
        description: &str,
        metadata: AgentMetadata,
    ) -> Result<Agent> {
        let messages = self.messages();
        self.stores
            .agents
            .save(name, description, messages, metadata)
            .await
    }

    /// Replace the conversation with a copy of the agent's messages.
    pub fn load_agent(&self, id: &str) -> Result<Agent> {
        let agent = self
            .stores
            .agents
            .load(id)
            .ok_or_else(|| Error::NotFound(format!("Agent '{id}'")))?;

        let mut state = lock(&self.state);
        state.messages = agent.messages.clone();
        state.title = Some(agent.name.clone());
        info!(target: "session::controller", id, name = %agent.name, "Loaded agent");
        Ok(agent)
    }

    pub async fn delete_agent(&self, id: &str) -> Result<bool> {
        self.stores.agents.delete(id).await
    }
}
