use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::registry::ToolRegistry;
use crate::error::Result;
use crate::storage::{KeyValueStore, PersistedCell, keys, read_document};
use crate::subscription::Subscription;

pub type EnabledTools = BTreeSet<String>;

/// The set of tool ids the user has turned on, persisted under `enabledTools`.
///
/// Tools marked `always_enabled` in the catalog are always members. Ids the
/// catalog does not know are kept as-is.
pub struct ToolEnablementStore {
    cell: PersistedCell<EnabledTools>,
    registry: Arc<ToolRegistry>,
}

impl ToolEnablementStore {
    pub async fn load(backend: Arc<dyn KeyValueStore>, registry: Arc<ToolRegistry>) -> Result<Self> {
        let persisted: Option<EnabledTools> =
            read_document(backend.as_ref(), keys::ENABLED_TOOLS).await?;

        let enabled = match persisted {
            Some(mut ids) => {
                for pinned in registry.pinned_ids() {
                    if ids.insert(pinned.clone()) {
                        debug!(target: "tools::enablement", tool = %pinned, "Restored pinned tool");
                    }
                }
                ids
            }
            None => registry.default_enabled_ids(),
        };

        Ok(Self {
            cell: PersistedCell::new(keys::ENABLED_TOOLS, backend, enabled),
            registry,
        })
    }

    pub fn enabled_ids(&self) -> EnabledTools {
        self.cell.get()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.cell.read(|ids| ids.contains(id))
    }

    /// Flip membership of `id` and return whether it is enabled afterwards.
    ///
    /// Pinned tools stay enabled; coming-soon tools cannot be turned on.
    pub async fn toggle(&self, id: &str) -> Result<bool> {
        let pinned = self.registry.is_pinned(id);
        let coming_soon = self.registry.is_coming_soon(id);

        let changed = self
            .cell
            .update(|ids| {
                if pinned {
                    return None;
                }
                if ids.remove(id) {
                    return Some(false);
                }
                if coming_soon {
                    return None;
                }
                ids.insert(id.to_string());
                Some(true)
            })
            .await?;

        match changed {
            Some(now_enabled) => {
                info!(target: "tools::enablement", tool = id, enabled = now_enabled, "Toggled tool");
                Ok(now_enabled)
            }
            None => Ok(self.is_enabled(id)),
        }
    }

    pub async fn enable(&self, id: &str) -> Result<()> {
        if self.registry.is_coming_soon(id) {
            debug!(target: "tools::enablement", tool = id, "Ignoring enable for coming-soon tool");
            return Ok(());
        }
        let changed = self
            .cell
            .update(|ids| ids.insert(id.to_string()).then_some(()))
            .await?;
        if changed.is_some() {
            info!(target: "tools::enablement", tool = id, "Enabled tool");
        }
        Ok(())
    }

    pub async fn disable(&self, id: &str) -> Result<()> {
        if self.registry.is_pinned(id) {
            debug!(target: "tools::enablement", tool = id, "Ignoring disable for pinned tool");
            return Ok(());
        }
        let changed = self.cell.update(|ids| ids.remove(id).then_some(())).await?;
        if changed.is_some() {
            info!(target: "tools::enablement", tool = id, "Disabled tool");
        }
        Ok(())
    }

    /// Context prompts of the enabled tools, in catalog order, separated by a
    /// blank line. Tools without a prompt contribute nothing.
    pub fn compose_context(&self, registry: &ToolRegistry) -> String {
        self.cell.read(|ids| {
            registry
                .list()
                .iter()
                .filter(|tool| ids.contains(&tool.id))
                .map(|tool| tool.context_prompt.trim())
                .filter(|prompt| !prompt.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&EnabledTools) + Send + Sync + 'static,
    {
        self.cell.subscribe(callback)
    }
}
