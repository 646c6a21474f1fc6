use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::auth::{Credentials, resolve_api_key};
use crate::config::model::ModelInfo;
use crate::config::provider::{ApiFormat, ProviderConfig};
use crate::config::{EnvProvider, StdEnvProvider};
use crate::settings::ProviderSetting;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const GOOGLE_MODEL_PREFIX: &str = "models/";

#[derive(Debug, Error)]
pub enum ModelFetchError {
    #[error("No API key available for {provider}")]
    MissingApiKey { provider: String },

    #[error("No base URL configured for {provider}")]
    MissingBaseUrl { provider: String },

    #[error("Invalid base URL for {provider}: {details}")]
    InvalidBaseUrl { provider: String, details: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{provider} returned status {status_code}: {details}")]
    Http {
        provider: String,
        status_code: u16,
        details: String,
    },

    #[error("Failed to parse model list from {provider}: {details}")]
    ResponseParsing { provider: String, details: String },

    #[error("{provider} does not list models at runtime")]
    Unsupported { provider: String },
}

/// Source of a provider's runtime model list.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    async fn fetch_models(
        &self,
        provider: &ProviderConfig,
        credentials: &Credentials,
        setting: &ProviderSetting,
    ) -> Result<Vec<ModelInfo>, ModelFetchError>;
}

/// Lists models over each provider's HTTP API.
pub struct HttpModelFetcher {
    http_client: reqwest::Client,
    env: Arc<dyn EnvProvider>,
}

impl HttpModelFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ModelFetchError> {
        Self::with_env(timeout, Arc::new(StdEnvProvider))
    }

    pub fn with_env(timeout: Duration, env: Arc<dyn EnvProvider>) -> Result<Self, ModelFetchError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, env })
    }

    fn base_url(provider: &ProviderConfig, setting: &ProviderSetting) -> Result<Url, ModelFetchError> {
        match setting.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(raw) => Url::parse(raw).map_err(|e| ModelFetchError::InvalidBaseUrl {
                provider: provider.id.to_string(),
                details: e.to_string(),
            }),
            None => provider
                .base_url
                .clone()
                .ok_or_else(|| ModelFetchError::MissingBaseUrl {
                    provider: provider.id.to_string(),
                }),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        provider: &ProviderConfig,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ModelFetchError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            debug!(
                target: "api::models",
                provider = %provider.id,
                "Model listing failed - Status: {}, Body: {}",
                status,
                error_text
            );
            return Err(ModelFetchError::Http {
                provider: provider.id.to_string(),
                status_code: status.as_u16(),
                details: error_text,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(
                target: "api::models",
                provider = %provider.id,
                "Failed to parse model list: {}, Body: {}",
                e,
                body
            );
            ModelFetchError::ResponseParsing {
                provider: provider.id.to_string(),
                details: e.to_string(),
            }
        })
    }
}

fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicModelList {
    data: Vec<AnthropicModel>,
}

#[derive(Debug, Deserialize)]
struct AnthropicModel {
    id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleModelList {
    #[serde(default)]
    models: Vec<GoogleModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[async_trait]
impl ModelFetcher for HttpModelFetcher {
    async fn fetch_models(
        &self,
        provider: &ProviderConfig,
        credentials: &Credentials,
        setting: &ProviderSetting,
    ) -> Result<Vec<ModelInfo>, ModelFetchError> {
        if !provider.supports_dynamic_models() {
            return Err(ModelFetchError::Unsupported {
                provider: provider.id.to_string(),
            });
        }

        let api_key = resolve_api_key(credentials, provider, self.env.as_ref()).ok_or_else(|| {
            ModelFetchError::MissingApiKey {
                provider: provider.id.to_string(),
            }
        })?;
        let base = Self::base_url(provider, setting)?;

        debug!(
            target: "api::models",
            provider = %provider.id,
            format = %provider.api_format,
            "Listing models"
        );

        let models = match provider.api_format {
            ApiFormat::Openai => {
                let request = self
                    .http_client
                    .get(endpoint(&base, "models"))
                    .bearer_auth(&api_key);
                let list: OpenAiModelList = self.get_json(provider, request).await?;
                list.data
                    .into_iter()
                    .map(|m| ModelInfo::new(provider.id.clone(), &m.id, &m.id))
                    .collect()
            }
            ApiFormat::Anthropic => {
                let request = self
                    .http_client
                    .get(endpoint(&base, "v1/models"))
                    .header("x-api-key", &api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header(header::ACCEPT, "application/json");
                let list: AnthropicModelList = self.get_json(provider, request).await?;
                list.data
                    .into_iter()
                    .map(|m| {
                        let label = m.display_name.unwrap_or_else(|| m.id.clone());
                        ModelInfo::new(provider.id.clone(), m.id, label)
                    })
                    .collect()
            }
            ApiFormat::Google => {
                let request = self
                    .http_client
                    .get(endpoint(&base, "v1beta/models"))
                    .query(&[("key", api_key.as_str())]);
                let list: GoogleModelList = self.get_json(provider, request).await?;
                list.models
                    .into_iter()
                    .filter(|m| {
                        m.supported_generation_methods.is_empty()
                            || m
                                .supported_generation_methods
                                .iter()
                                .any(|g| g == "generateContent")
                    })
                    .map(|m| {
                        let name = m
                            .name
                            .strip_prefix(GOOGLE_MODEL_PREFIX)
                            .unwrap_or(&m.name)
                            .to_string();
                        let label = m.display_name.unwrap_or_else(|| name.clone());
                        ModelInfo::new(provider.id.clone(), name, label)
                    })
                    .collect()
            }
        };

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProviderCatalog;
    use crate::config::provider::{self, ProviderId};
    use crate::test_utils::MapEnvProvider;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpModelFetcher {
        HttpModelFetcher::with_env(
            Duration::from_secs(5),
            Arc::new(MapEnvProvider::default()),
        )
        .unwrap()
    }

    fn provider_at(id: ProviderId, server: &MockServer) -> ProviderConfig {
        let mut config = ProviderCatalog::builtin()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap();
        config.base_url = Some(Url::parse(&server.uri()).unwrap());
        config
    }

    fn credentials(provider: &str, key: &str) -> Credentials {
        [(provider.to_string(), key.to_string())].into()
    }

    #[tokio::test]
    async fn lists_openai_models_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{ "id": "gpt-4.1", "object": "model" }, { "id": "o3" }]
            })))
            .mount(&server)
            .await;

        let provider = provider_at(provider::openai(), &server);
        let models = fetcher()
            .fetch_models(&provider, &credentials("openai", "sk-test"), &ProviderSetting::default())
            .await
            .unwrap();

        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gpt-4.1", "o3"]);
        assert!(models.iter().all(|m| m.provider == provider::openai()));
    }

    #[tokio::test]
    async fn lists_anthropic_models_with_display_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "claude-sonnet-4-0", "display_name": "Claude Sonnet 4" }],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let provider = provider_at(provider::anthropic(), &server);
        let models = fetcher()
            .fetch_models(&provider, &credentials("anthropic", "ak-test"), &ProviderSetting::default())
            .await
            .unwrap();

        assert_eq!(
            models,
            vec![ModelInfo::new(provider::anthropic(), "claude-sonnet-4-0", "Claude Sonnet 4")]
        );
    }

    #[tokio::test]
    async fn lists_google_models_and_strips_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(query_param("key", "g-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {
                        "name": "models/gemini-2.5-pro",
                        "displayName": "Gemini 2.5 Pro",
                        "supportedGenerationMethods": ["generateContent", "countTokens"]
                    },
                    {
                        "name": "models/text-embedding-004",
                        "displayName": "Text Embedding 004",
                        "supportedGenerationMethods": ["embedContent"]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider_at(provider::google(), &server);
        let models = fetcher()
            .fetch_models(&provider, &credentials("google", "g-test"), &ProviderSetting::default())
            .await
            .unwrap();

        assert_eq!(
            models,
            vec![ModelInfo::new(provider::google(), "gemini-2.5-pro", "Gemini 2.5 Pro")]
        );
    }

    #[tokio::test]
    async fn setting_base_url_takes_precedence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxy/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": "local" }] })))
            .mount(&server)
            .await;

        let catalog = ProviderCatalog::builtin().unwrap();
        let provider = catalog.get(&provider::openai()).unwrap();
        let setting = ProviderSetting {
            base_url: Some(format!("{}/proxy/", server.uri())),
            ..ProviderSetting::default()
        };

        let models = fetcher()
            .fetch_models(provider, &credentials("openai", "k"), &setting)
            .await
            .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "local");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = provider_at(provider::openai(), &server);
        let err = fetcher()
            .fetch_models(&provider, &credentials("openai", "nope"), &ProviderSetting::default())
            .await
            .unwrap_err();

        match err {
            ModelFetchError::Http {
                status_code,
                details,
                ..
            } => {
                assert_eq!(status_code, 401);
                assert_eq!(details, "bad key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let provider = provider_at(provider::openai(), &server);
        let err = fetcher()
            .fetch_models(&provider, &credentials("openai", "k"), &ProviderSetting::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelFetchError::ResponseParsing { .. }));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let catalog = ProviderCatalog::builtin().unwrap();
        let provider = catalog.get(&provider::openai()).unwrap();

        let err = fetcher()
            .fetch_models(provider, &Credentials::new(), &ProviderSetting::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelFetchError::MissingApiKey { .. }));
    }

    #[tokio::test]
    async fn environment_key_is_used_when_none_is_stored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-env"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let fetcher = HttpModelFetcher::with_env(
            Duration::from_secs(5),
            Arc::new(MapEnvProvider::from([("OPENAI_API_KEY", "sk-env")])),
        )
        .unwrap();
        let provider = provider_at(provider::openai(), &server);

        let models = fetcher
            .fetch_models(&provider, &Credentials::new(), &ProviderSetting::default())
            .await
            .unwrap();
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn static_only_provider_is_unsupported() {
        let catalog = ProviderCatalog::builtin().unwrap();
        let provider = catalog.get(&provider::deepseek()).unwrap();

        let err = fetcher()
            .fetch_models(provider, &credentials("deepseek", "k"), &ProviderSetting::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelFetchError::Unsupported { .. }));
    }
}
