//! Durable key-value backing for the persisted stores.
//!
//! Each store owns exactly one logical key (see [`keys`]) and keeps a whole
//! JSON document under it. Backends only move bytes; they know nothing about
//! the documents they hold.

mod document;
mod file;
mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use document::{PersistedCell, read_document, write_document};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Logical keys, one per store. No two stores share a key.
pub mod keys {
    pub const API_KEYS: &str = "apiKeys";
    pub const PROVIDERS: &str = "providers";
    pub const ENABLED_TOOLS: &str = "enabledTools";
    pub const AGENTS: &str = "agents";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to connect to storage: {message}")]
    Connection { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw document stored under `key`, or `None` if it was never written.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the document stored under `key`. Either the whole value lands or nothing does.
    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}
