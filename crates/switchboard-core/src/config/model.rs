use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::provider::ProviderId;

/// Model identity: `(provider, model name)`.
pub type ModelKey = (ProviderId, String);

/// A selectable model within one provider's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The provider-side model identifier (e.g. "gpt-4o").
    pub name: String,
    /// Human readable name shown in pickers.
    pub label: String,
    pub provider: ProviderId,
}

impl ModelInfo {
    pub fn new(provider: ProviderId, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            provider,
        }
    }

    pub fn key(&self) -> ModelKey {
        (self.provider.clone(), self.name.clone())
    }
}

/// Collapse entries that share a `(provider, name)` key.
///
/// A later entry replaces an earlier one wholesale (no field-by-field merge)
/// but keeps the earlier entry's position, so static models stay first.
pub fn merge_unique(models: impl IntoIterator<Item = ModelInfo>) -> Vec<ModelInfo> {
    let mut merged: Vec<ModelInfo> = Vec::new();
    let mut positions: HashMap<ModelKey, usize> = HashMap::new();

    for model in models {
        let key = model.key();
        if let Some(&idx) = positions.get(&key) {
            merged[idx] = model;
        } else {
            positions.insert(key, merged.len());
            merged.push(model);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(provider: &str, name: &str, label: &str) -> ModelInfo {
        ModelInfo::new(ProviderId::from(provider), name, label)
    }

    #[test]
    fn later_entry_replaces_earlier_in_place() {
        let merged = merge_unique(vec![
            model("a", "m1", "static m1"),
            model("a", "m2", "static m2"),
            model("a", "m1", "dynamic m1"),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].label, "dynamic m1");
        assert_eq!(merged[1].name, "m2");
    }

    #[test]
    fn same_name_under_different_providers_is_distinct() {
        let merged = merge_unique(vec![model("a", "shared", "A"), model("b", "shared", "B")]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn model_info_json_shape() {
        let json = serde_json::to_value(model("openai", "gpt-4o", "GPT-4o")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "gpt-4o", "label": "GPT-4o", "provider": "openai"})
        );
    }
}
