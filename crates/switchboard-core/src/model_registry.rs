use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::api::models::ModelFetcher;
use crate::auth::Credentials;
use crate::catalog::ProviderCatalog;
use crate::config::model::{ModelInfo, merge_unique};
use crate::config::provider::{ProviderConfig, ProviderId};
use crate::settings::ProviderSettings;
use crate::subscription::{Subscribers, Subscription};

/// What a registry refresh is currently waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingScope {
    All,
    Provider(ProviderId),
}

impl fmt::Display for LoadingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadingScope::All => f.write_str("all"),
            LoadingScope::Provider(id) => write!(f, "{id}"),
        }
    }
}

/// Published view of the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelListState {
    pub models: Vec<ModelInfo>,
    pub loading: Option<LoadingScope>,
    /// Last fetch error per provider, cleared by the next successful fetch.
    pub failures: BTreeMap<ProviderId, String>,
}

/// How a single-provider refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Failed,
    /// A newer refresh for the same provider was issued before this one settled.
    Superseded,
    /// The provider is unknown or has no runtime model list.
    Skipped,
}

struct Inner {
    state: ModelListState,
    tokens: HashMap<ProviderId, u64>,
}

impl Inner {
    fn issue_token(&mut self, provider: &ProviderId) -> u64 {
        let token = self.tokens.entry(provider.clone()).or_insert(0);
        *token += 1;
        *token
    }

    fn is_current(&self, provider: &ProviderId, token: u64) -> bool {
        self.tokens.get(provider) == Some(&token)
    }

    /// Swap every entry of `provider` for `replacement`, keeping the
    /// provider's block where it was in the list.
    fn replace_provider_models(&mut self, provider: &ProviderId, replacement: Vec<ModelInfo>) {
        let models = &mut self.state.models;
        let at = models
            .iter()
            .position(|m| &m.provider == provider)
            .unwrap_or(models.len());
        models.retain(|m| &m.provider != provider);
        let at = at.min(models.len());
        models.splice(at..at, replacement);
    }
}

/// Live list of selectable models: static catalog entries merged with what
/// each provider reports at runtime.
pub struct ModelRegistry {
    catalog: Arc<ProviderCatalog>,
    fetcher: Arc<dyn ModelFetcher>,
    inner: Mutex<Inner>,
    subscribers: Subscribers<ModelListState>,
}

impl ModelRegistry {
    /// Starts out with every provider's static models, in catalog order.
    pub fn new(catalog: Arc<ProviderCatalog>, fetcher: Arc<dyn ModelFetcher>) -> Self {
        let models: Vec<ModelInfo> = catalog
            .list()
            .iter()
            .flat_map(ProviderConfig::static_models)
            .collect();
        Self {
            catalog,
            fetcher,
            inner: Mutex::new(Inner {
                state: ModelListState {
                    models: merge_unique(models),
                    ..ModelListState::default()
                },
                tokens: HashMap::new(),
            }),
            subscribers: Subscribers::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, then notify subscribers with the resulting state.
    fn mutate<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let (result, snapshot) = {
            let mut inner = self.lock();
            let result = f(&mut inner);
            (result, inner.state.clone())
        };
        self.subscribers.notify(&snapshot);
        result
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn snapshot(&self) -> ModelListState {
        self.lock().state.clone()
    }

    pub fn current_models(&self) -> Vec<ModelInfo> {
        self.lock().state.models.clone()
    }

    pub fn models_for(&self, provider: &ProviderId) -> Vec<ModelInfo> {
        self.lock()
            .state
            .models
            .iter()
            .filter(|m| &m.provider == provider)
            .cloned()
            .collect()
    }

    pub fn loading_scope(&self) -> Option<LoadingScope> {
        self.lock().state.loading.clone()
    }

    pub fn failures(&self) -> BTreeMap<ProviderId, String> {
        self.lock().state.failures.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ModelListState) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Re-fetch every provider with a runtime model list, concurrently.
    ///
    /// Each such provider ends up with its static models followed by whatever
    /// it returned; a provider whose fetch failed ends up with just its static
    /// models and the failure recorded. Providers refreshed individually while
    /// this call was in flight keep the newer result.
    pub async fn refresh_all(&self, credentials: &Credentials, settings: &ProviderSettings) {
        let providers: Vec<&ProviderConfig> = self.catalog.dynamic().collect();

        let tokens: Vec<u64> = self.mutate(|inner| {
            inner.state.loading = Some(LoadingScope::All);
            providers
                .iter()
                .map(|p| inner.issue_token(&p.id))
                .collect()
        });
        debug!(
            target: "model_registry::refresh_all",
            providers = providers.len(),
            "Refreshing dynamic models"
        );

        let results = join_all(providers.iter().map(|provider| {
            let setting = settings
                .get(provider.id.as_str())
                .cloned()
                .unwrap_or_default();
            async move {
                self.fetcher
                    .fetch_models(provider, credentials, &setting)
                    .await
            }
        }))
        .await;

        self.mutate(|inner| {
            for ((provider, token), result) in providers.iter().zip(tokens).zip(results) {
                if !inner.is_current(&provider.id, token) {
                    debug!(
                        target: "model_registry::refresh_all",
                        provider = %provider.id,
                        token,
                        "Discarding superseded result"
                    );
                    continue;
                }

                let replacement = match result {
                    Ok(dynamic) => {
                        info!(
                            target: "model_registry::refresh_all",
                            provider = %provider.id,
                            count = dynamic.len(),
                            "Fetched dynamic models"
                        );
                        inner.state.failures.remove(&provider.id);
                        merge_unique(provider.static_models().into_iter().chain(dynamic))
                    }
                    Err(e) => {
                        warn!(
                            target: "model_registry::refresh_all",
                            provider = %provider.id,
                            error = %e,
                            "Dynamic model fetch failed, using static models"
                        );
                        inner.state.failures.insert(provider.id.clone(), e.to_string());
                        provider.static_models()
                    }
                };
                inner.replace_provider_models(&provider.id, replacement);
            }

            if inner.state.loading == Some(LoadingScope::All) {
                inner.state.loading = None;
            }
        });
    }

    /// Re-fetch one provider's models.
    ///
    /// On success the provider's entries become its static models followed by
    /// the fetched ones. On failure they are left as they were. Only the most
    /// recently issued refresh for a provider may commit.
    pub async fn refresh_one(
        &self,
        provider_id: &ProviderId,
        credentials: &Credentials,
        settings: &ProviderSettings,
    ) -> RefreshOutcome {
        let Some(provider) = self.catalog.get(provider_id) else {
            warn!(
                target: "model_registry::refresh_one",
                provider = %provider_id,
                "Refresh requested for unknown provider"
            );
            return RefreshOutcome::Skipped;
        };
        if !provider.supports_dynamic_models() {
            return RefreshOutcome::Skipped;
        }

        let token = self.mutate(|inner| {
            inner.state.loading = Some(LoadingScope::Provider(provider_id.clone()));
            inner.issue_token(provider_id)
        });
        debug!(
            target: "model_registry::refresh_one",
            provider = %provider_id,
            token,
            "Refreshing dynamic models"
        );

        let setting = settings
            .get(provider_id.as_str())
            .cloned()
            .unwrap_or_default();
        let result = self
            .fetcher
            .fetch_models(provider, credentials, &setting)
            .await;

        let (outcome, snapshot) = {
            let mut inner = self.lock();
            if !inner.is_current(provider_id, token) {
                debug!(
                    target: "model_registry::refresh_one",
                    provider = %provider_id,
                    token,
                    "Discarding superseded result"
                );
                return RefreshOutcome::Superseded;
            }

            let outcome = match result {
                Ok(dynamic) => {
                    info!(
                        target: "model_registry::refresh_one",
                        provider = %provider_id,
                        count = dynamic.len(),
                        "Fetched dynamic models"
                    );
                    inner.state.failures.remove(provider_id);
                    let replacement =
                        merge_unique(provider.static_models().into_iter().chain(dynamic));
                    inner.replace_provider_models(provider_id, replacement);
                    RefreshOutcome::Applied
                }
                Err(e) => {
                    warn!(
                        target: "model_registry::refresh_one",
                        provider = %provider_id,
                        error = %e,
                        "Dynamic model fetch failed, keeping current models"
                    );
                    inner.state.failures.insert(provider_id.clone(), e.to_string());
                    RefreshOutcome::Failed
                }
            };

            if inner.state.loading == Some(LoadingScope::Provider(provider_id.clone())) {
                inner.state.loading = None;
            }
            (outcome, inner.state.clone())
        };
        self.subscribers.notify(&snapshot);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::provider::{self, ApiFormat, CatalogModel};
    use crate::test_utils::{ScriptedModelFetcher, model};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider_config(id: &str, dynamic: bool, models: &[&str]) -> ProviderConfig {
        ProviderConfig {
            id: ProviderId::from(id),
            name: id.to_uppercase(),
            api_format: ApiFormat::Openai,
            base_url: None,
            api_key_env: None,
            dynamic_models: dynamic,
            models: models
                .iter()
                .map(|m| CatalogModel {
                    name: (*m).to_string(),
                    label: m.to_uppercase(),
                })
                .collect(),
        }
    }

    fn registry(fetcher: Arc<ScriptedModelFetcher>) -> ModelRegistry {
        let catalog = ProviderCatalog::from_providers(vec![
            provider_config("a", true, &["m1"]),
            provider_config("b", false, &["s1", "s2"]),
            provider_config("c", true, &["c1"]),
        ]);
        ModelRegistry::new(Arc::new(catalog), fetcher)
    }

    fn names(models: &[ModelInfo]) -> Vec<&str> {
        models.iter().map(|m| m.name.as_str()).collect()
    }

    fn a() -> ProviderId {
        ProviderId::from("a")
    }

    #[test]
    fn starts_with_static_models() {
        let reg = registry(Arc::new(ScriptedModelFetcher::new()));
        assert_eq!(names(&reg.current_models()), vec!["m1", "s1", "s2", "c1"]);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn refresh_one_merges_static_and_dynamic() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_ok(a(), vec![model("a", "m2")]);
        let reg = registry(fetcher);

        let outcome = reg
            .refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;

        assert_eq!(outcome, RefreshOutcome::Applied);
        assert_eq!(names(&reg.models_for(&a())), vec!["m1", "m2"]);
        assert_eq!(names(&reg.current_models()), vec!["m1", "m2", "s1", "s2", "c1"]);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn refresh_one_dedupes_dynamic_entries_matching_static() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_ok(
            a(),
            vec![ModelInfo::new(a(), "m1", "Fresh label"), model("a", "m2")],
        );
        let reg = registry(fetcher);

        reg.refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;

        let models = reg.models_for(&a());
        assert_eq!(names(&models), vec!["m1", "m2"]);
        assert_eq!(models[0].label, "Fresh label");
    }

    #[tokio::test]
    async fn refresh_one_failure_keeps_current_entries() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_ok(a(), vec![model("a", "m2")]);
        fetcher.push_err(a(), "boom");
        let reg = registry(fetcher);

        reg.refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;
        let outcome = reg
            .refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;

        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(names(&reg.models_for(&a())), vec!["m1", "m2"]);
        assert_eq!(reg.loading_scope(), None);
        assert!(reg.failures()[&a()].contains("boom"));
    }

    #[tokio::test]
    async fn failed_first_fetch_leaves_static_models() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_err(a(), "unreachable");
        let reg = registry(fetcher);

        reg.refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;

        assert_eq!(names(&reg.models_for(&a())), vec!["m1"]);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn static_only_provider_is_never_touched() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        let reg = registry(fetcher.clone());

        let outcome = reg
            .refresh_one(&ProviderId::from("b"), &Credentials::new(), &ProviderSettings::new())
            .await;
        reg.refresh_all(&Credentials::new(), &ProviderSettings::new())
            .await;

        assert_eq!(outcome, RefreshOutcome::Skipped);
        assert_eq!(names(&reg.models_for(&ProviderId::from("b"))), vec!["s1", "s2"]);
        assert_eq!(fetcher.calls(&ProviderId::from("b")), 0);
    }

    #[tokio::test]
    async fn unknown_provider_is_skipped() {
        let reg = registry(Arc::new(ScriptedModelFetcher::new()));
        let outcome = reg
            .refresh_one(&ProviderId::from("zzz"), &Credentials::new(), &ProviderSettings::new())
            .await;
        assert_eq!(outcome, RefreshOutcome::Skipped);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn refresh_all_falls_back_per_provider() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_ok(a(), vec![model("a", "m2")]);
        fetcher.push_err(ProviderId::from("c"), "no key");
        let reg = registry(fetcher);

        reg.refresh_all(&Credentials::new(), &ProviderSettings::new())
            .await;

        assert_eq!(names(&reg.current_models()), vec!["m1", "m2", "s1", "s2", "c1"]);
        let failures = reg.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures.contains_key(&ProviderId::from("c")));
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn refresh_all_resets_failed_provider_to_static() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_ok(a(), vec![model("a", "m2")]);
        fetcher.push_err(a(), "down");
        fetcher.push_err(ProviderId::from("c"), "down");
        let reg = registry(fetcher);

        reg.refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;
        reg.refresh_all(&Credentials::new(), &ProviderSettings::new())
            .await;

        assert_eq!(names(&reg.models_for(&a())), vec!["m1"]);
    }

    #[tokio::test]
    async fn loading_scope_is_visible_while_in_flight() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        let gate = fetcher.push_gated(a());
        let reg = registry(fetcher);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = reg.subscribe(move |s| sink.lock().unwrap().push(s.loading.clone()));

        let provider_a = a();
        let creds = Credentials::new();
        let settings = ProviderSettings::new();
        let refresh = reg.refresh_one(&provider_a, &creds, &settings);
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(reg.loading_scope(), Some(LoadingScope::Provider(a())));
            gate.send(Ok(vec![model("a", "m2")])).unwrap();
        };
        let (outcome, ()) = futures::join!(refresh, release);

        assert_eq!(outcome, RefreshOutcome::Applied);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(LoadingScope::Provider(a())), None]
        );
    }

    #[tokio::test]
    async fn older_result_arriving_last_is_discarded() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        let first = fetcher.push_gated(a());
        let second = fetcher.push_gated(a());
        let reg = registry(fetcher);
        let provider_a = a();
        let creds = Credentials::new();
        let settings = ProviderSettings::new();

        let release = async {
            second.send(Ok(vec![model("a", "newer")])).unwrap();
            tokio::task::yield_now().await;
            first.send(Ok(vec![model("a", "older")])).unwrap();
        };
        let (r1, r2, ()) = futures::join!(
            reg.refresh_one(&provider_a, &creds, &settings),
            reg.refresh_one(&provider_a, &creds, &settings),
            release
        );

        assert_eq!(r1, RefreshOutcome::Superseded);
        assert_eq!(r2, RefreshOutcome::Applied);
        assert_eq!(names(&reg.models_for(&a())), vec!["m1", "newer"]);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn older_result_arriving_first_does_not_clear_loading() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        let first = fetcher.push_gated(a());
        let second = fetcher.push_gated(a());
        let reg = registry(fetcher);
        let provider_a = a();
        let creds = Credentials::new();
        let settings = ProviderSettings::new();

        let release = async {
            first.send(Ok(vec![model("a", "older")])).unwrap();
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(reg.loading_scope(), Some(LoadingScope::Provider(a())));
            assert_eq!(names(&reg.models_for(&a())), vec!["m1"]);
            second.send(Err("late failure".to_string())).unwrap();
        };
        let (r1, r2, ()) = futures::join!(
            reg.refresh_one(&provider_a, &creds, &settings),
            reg.refresh_one(&provider_a, &creds, &settings),
            release
        );

        assert_eq!(r1, RefreshOutcome::Superseded);
        assert_eq!(r2, RefreshOutcome::Failed);
        assert_eq!(names(&reg.models_for(&a())), vec!["m1"]);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn refresh_one_during_refresh_all_wins_for_its_provider() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        let all_a = fetcher.push_gated(a());
        fetcher.push_ok(ProviderId::from("c"), vec![model("c", "c2")]);
        fetcher.push_ok(a(), vec![model("a", "single")]);
        let reg = registry(fetcher);
        let provider_a = a();
        let creds = Credentials::new();
        let settings = ProviderSettings::new();

        let (_, single, ()) = futures::join!(
            reg.refresh_all(&creds, &settings),
            reg.refresh_one(&provider_a, &creds, &settings),
            async {
                all_a.send(Ok(vec![model("a", "from-all")])).unwrap();
            }
        );

        assert_eq!(single, RefreshOutcome::Applied);
        assert_eq!(names(&reg.models_for(&a())), vec!["m1", "single"]);
        assert_eq!(names(&reg.models_for(&ProviderId::from("c"))), vec!["c1", "c2"]);
        assert_eq!(reg.loading_scope(), None);
    }

    #[tokio::test]
    async fn subscribers_fire_on_start_and_commit() {
        let fetcher = Arc::new(ScriptedModelFetcher::new());
        fetcher.push_ok(a(), vec![]);
        let reg = registry(fetcher);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _sub = reg.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        reg.refresh_one(&a(), &Credentials::new(), &ProviderSettings::new())
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Issue several overlapping refreshes and settle them in an arbitrary
        /// order; only the last one issued may be committed.
        #[test]
        fn only_last_issued_refresh_commits(
            order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle(),
            last_fails in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let fetcher = Arc::new(ScriptedModelFetcher::new());
                let gates: Vec<_> = (0..order.len()).map(|_| fetcher.push_gated(a())).collect();
                let reg = registry(fetcher);
                let provider_a = a();
                let creds = Credentials::new();
                let settings = ProviderSettings::new();
                let (reg, provider_a, creds, settings) = (&reg, &provider_a, &creds, &settings);

                let calls = join_all(
                    (0..order.len()).map(|_| reg.refresh_one(provider_a, creds, settings)),
                );
                let release = async {
                    let mut gates: Vec<_> = gates.into_iter().map(Some).collect();
                    for &i in &order {
                        tokio::task::yield_now().await;
                        let gate = gates[i].take().unwrap();
                        let result = if i == order.len() - 1 && last_fails {
                            Err("failed".to_string())
                        } else {
                            Ok(vec![model("a", &format!("call-{i}"))])
                        };
                        gate.send(result).unwrap();
                    }
                };
                let (outcomes, ()) = futures::join!(calls, release);

                let last = outcomes.len() - 1;
                for (i, outcome) in outcomes.iter().enumerate() {
                    if i == last {
                        let expected = if last_fails { RefreshOutcome::Failed } else { RefreshOutcome::Applied };
                        assert_eq!(*outcome, expected);
                    } else {
                        assert_eq!(*outcome, RefreshOutcome::Superseded);
                    }
                }

                let expected: Vec<String> = if last_fails {
                    vec!["m1".to_string()]
                } else {
                    vec!["m1".to_string(), format!("call-{last}")]
                };
                let actual: Vec<String> = reg.models_for(&a()).into_iter().map(|m| m.name).collect();
                assert_eq!(actual, expected);
                assert_eq!(reg.loading_scope(), None);
            });
        }
    }

    #[test]
    fn scope_display() {
        assert_eq!(LoadingScope::All.to_string(), "all");
        assert_eq!(
            LoadingScope::Provider(provider::openai()).to_string(),
            "openai"
        );
    }
}
