//! Test utilities for switchboard-core
//!
//! This module provides helpers for testing that need to be accessible
//! across crate boundaries.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::api::models::{ModelFetchError, ModelFetcher};
use crate::auth::Credentials;
use crate::config::EnvProvider;
use crate::config::model::ModelInfo;
use crate::config::provider::{ProviderConfig, ProviderId};
use crate::settings::ProviderSetting;

/// Scripted result for one fetch. Errors are plain messages and surface as
/// HTTP 500 failures.
pub type ScriptedResult = Result<Vec<ModelInfo>, String>;

enum Script {
    Ready(ScriptedResult),
    Gated(oneshot::Receiver<ScriptedResult>),
}

/// Model fetcher that replays queued responses per provider, in order.
///
/// A gated response does not settle until the test sends a result through the
/// returned sender, which makes overlapping refreshes deterministic. A fetch
/// with nothing queued fails.
#[derive(Default)]
pub struct ScriptedModelFetcher {
    scripts: Mutex<HashMap<ProviderId, VecDeque<Script>>>,
    calls: Mutex<HashMap<ProviderId, usize>>,
}

impl ScriptedModelFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, provider: ProviderId, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(provider)
            .or_default()
            .push_back(script);
    }

    pub fn push_ok(&self, provider: ProviderId, models: Vec<ModelInfo>) {
        self.push(provider, Script::Ready(Ok(models)));
    }

    pub fn push_err(&self, provider: ProviderId, message: impl Into<String>) {
        self.push(provider, Script::Ready(Err(message.into())));
    }

    pub fn push_gated(&self, provider: ProviderId) -> oneshot::Sender<ScriptedResult> {
        let (tx, rx) = oneshot::channel();
        self.push(provider, Script::Gated(rx));
        tx
    }

    pub fn calls(&self, provider: &ProviderId) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ModelFetcher for ScriptedModelFetcher {
    async fn fetch_models(
        &self,
        provider: &ProviderConfig,
        _credentials: &Credentials,
        _setting: &ProviderSetting,
    ) -> Result<Vec<ModelInfo>, ModelFetchError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(provider.id.clone())
            .or_insert(0) += 1;

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&provider.id)
            .and_then(VecDeque::pop_front);

        let result = match script {
            Some(Script::Ready(result)) => result,
            Some(Script::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err("gate dropped".to_string())),
            None => Err("no scripted response".to_string()),
        };

        result.map_err(|details| ModelFetchError::Http {
            provider: provider.id.to_string(),
            status_code: 500,
            details,
        })
    }
}

/// Environment backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct MapEnvProvider {
    vars: HashMap<String, String>,
}

impl<const N: usize> From<[(&str, &str); N]> for MapEnvProvider {
    fn from(vars: [(&str, &str); N]) -> Self {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl EnvProvider for MapEnvProvider {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// A model whose label is its name.
pub fn model(provider: &str, name: &str) -> ModelInfo {
    ModelInfo::new(ProviderId::from(provider), name, name)
}
