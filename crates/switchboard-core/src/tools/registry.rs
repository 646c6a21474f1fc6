use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumIter};

use crate::error::{Error, Result};

const DEFAULT_TOOLS_TOML: &str = include_str!("../../assets/default_tools.toml");

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolCategory {
    Blockchain,
    Payments,
    Ai,
    Infrastructure,
    Wallet,
    Web3,
    Api,
    Other,
}

/// An optional integration whose enablement injects `context_prompt` into
/// outbound requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    #[serde(default)]
    pub context_prompt: String,
    /// Whether a fresh install starts with this tool turned on.
    #[serde(default)]
    pub enabled: bool,
    /// Pinned: can never be turned off.
    #[serde(default)]
    pub always_enabled: bool,
    #[serde(default)]
    pub coming_soon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolsFile {
    tools: Vec<Tool>,
}

/// Read-only tool catalog, in declaration order.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn builtin() -> Result<Self> {
        let file: ToolsFile = toml::from_str(DEFAULT_TOOLS_TOML)
            .map_err(|e| Error::Configuration(format!("Failed to parse default tools: {e}")))?;
        Ok(Self::from_tools(file.tools))
    }

    pub fn from_tools(tools: Vec<Tool>) -> Self {
        Self { tools }
    }

    pub fn list(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Tools grouped by category; each group keeps catalog order.
    pub fn list_by_category(&self) -> BTreeMap<ToolCategory, Vec<&Tool>> {
        let mut grouped: BTreeMap<ToolCategory, Vec<&Tool>> = BTreeMap::new();
        for tool in &self.tools {
            grouped.entry(tool.category).or_default().push(tool);
        }
        grouped
    }

    pub fn pinned_ids(&self) -> BTreeSet<String> {
        self.tools
            .iter()
            .filter(|t| t.always_enabled)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.get(id).is_some_and(|t| t.always_enabled)
    }

    pub fn is_coming_soon(&self, id: &str) -> bool {
        self.get(id).is_some_and(|t| t.coming_soon)
    }

    /// The set a fresh install starts with: default-on tools plus pinned ones.
    pub fn default_enabled_ids(&self) -> BTreeSet<String> {
        self.tools
            .iter()
            .filter(|t| (t.enabled || t.always_enabled) && !t.coming_soon)
            .map(|t| t.id.clone())
            .collect()
    }
}
