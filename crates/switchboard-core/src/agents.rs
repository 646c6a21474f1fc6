use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::session::message::ChatMessage;
use crate::storage::{KeyValueStore, PersistedCell, keys, read_document};
use crate::subscription::Subscription;

/// Free-form data saved alongside an agent. Passed through untouched.
pub type AgentMetadata = serde_json::Map<String, serde_json::Value>;

/// A named snapshot of a conversation. Never changed after it is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AgentMetadata,
}

/// Saved agents in insertion order, persisted as one list under `agents`.
pub struct AgentStore {
    cell: PersistedCell<Vec<Agent>>,
}

impl AgentStore {
    /// Read the saved agents once. Corrupt data resets to an empty list.
    pub async fn open(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let agents: Vec<Agent> = read_document(backend.as_ref(), keys::AGENTS)
            .await?
            .unwrap_or_default();
        debug!(target: "agents", count = agents.len(), "Loaded agents");
        Ok(Self {
            cell: PersistedCell::new(keys::AGENTS, backend, agents),
        })
    }

    pub async fn save(
        &self,
        name: &str,
        description: &str,
        messages: Vec<ChatMessage>,
        metadata: AgentMetadata,
    ) -> Result<Agent> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Agent name cannot be empty".to_string()));
        }

        let saved = self
            .cell
            .update(|agents| {
                let mut id = Uuid::now_v7().to_string();
                while agents.iter().any(|a| a.id == id) {
                    id = Uuid::now_v7().to_string();
                }

                let agent = Agent {
                    id,
                    name: name.to_string(),
                    description: description.to_string(),
                    messages,
                    created_at: Utc::now(),
                    metadata,
                };
                agents.push(agent.clone());
                Some(agent)
            })
            .await?
            .ok_or_else(|| Error::Validation("Agent was not saved".to_string()))?;

        info!(target: "agents", id = %saved.id, name = %saved.name, "Saved agent");
        Ok(saved)
    }

    /// Remove the agent with `id`. Returns whether one was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .cell
            .update(|agents| {
                let before = agents.len();
                agents.retain(|a| a.id != id);
                (agents.len() != before).then_some(())
            })
            .await?
            .is_some();

        if removed {
            info!(target: "agents", id, "Deleted agent");
        } else {
            debug!(target: "agents", id, "Delete requested for unknown agent");
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Agent> {
        self.cell.get()
    }

    pub fn load(&self, id: &str) -> Option<Agent> {
        self.cell.read(|agents| agents.iter().find(|a| a.id == id).cloned())
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Agent>) + Send + Sync + 'static,
    {
        self.cell.subscribe(callback)
    }
}
