use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;
use url::Url;

use crate::config::model::ModelInfo;
use crate::error::{Error, Result};

const DEFAULT_PROVIDERS_TOML: &str = include_str!("../../assets/default_providers.toml");

/// Identifier for a provider (built-in or custom). This is the key every
/// other store uses to refer to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        ProviderId(s.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        ProviderId(s)
    }
}

/// Wire dialect used to list a provider's models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApiFormat {
    Openai,
    Anthropic,
    Google,
}

/// A model entry as written in a catalog file; the provider is implied by
/// the enclosing `[[providers]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModel {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub name: String,
    pub api_format: ApiFormat,
    /// Default HTTP base URL. A per-user provider setting takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
    /// Environment variable consulted when no key has been stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Whether the provider can list its models at runtime.
    #[serde(default)]
    pub dynamic_models: bool,
    #[serde(default)]
    pub models: Vec<CatalogModel>,
}

impl ProviderConfig {
    pub fn supports_dynamic_models(&self) -> bool {
        self.dynamic_models
    }

    /// The built-in model list, tagged with this provider.
    pub fn static_models(&self) -> Vec<ModelInfo> {
        self.models
            .iter()
            .map(|m| ModelInfo::new(self.id.clone(), &m.name, &m.label))
            .collect()
    }
}

/// Root structure for provider catalog files.
#[derive(Debug, Deserialize, Serialize)]
pub struct ProvidersFile {
    pub providers: Vec<ProviderConfig>,
}

pub fn parse_providers(toml_str: &str) -> Result<Vec<ProviderConfig>> {
    let file: ProvidersFile = toml::from_str(toml_str)
        .map_err(|e| Error::Configuration(format!("Failed to parse provider catalog: {e}")))?;
    Ok(file.providers)
}

/// Providers shipped with the binary, in catalog order.
pub fn builtin_providers() -> Result<Vec<ProviderConfig>> {
    parse_providers(DEFAULT_PROVIDERS_TOML)
}

pub const ANTHROPIC_ID: &str = "anthropic";
pub const DEEPSEEK_ID: &str = "deepseek";
pub const GOOGLE_ID: &str = "google";
pub const OPENAI_ID: &str = "openai";

#[inline]
pub fn anthropic() -> ProviderId {
    ProviderId::from(ANTHROPIC_ID)
}

#[inline]
pub fn deepseek() -> ProviderId {
    ProviderId::from(DEEPSEEK_ID)
}

#[inline]
pub fn google() -> ProviderId {
    ProviderId::from(GOOGLE_ID)
}

#[inline]
pub fn openai() -> ProviderId {
    ProviderId::from(OPENAI_ID)
}
