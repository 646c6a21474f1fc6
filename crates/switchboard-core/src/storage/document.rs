use serde::{Serialize, de::DeserializeOwned};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use super::{KeyValueStore, StorageError};
use crate::subscription::{Subscribers, Subscription};

/// Read and decode the JSON document under `key`.
///
/// A missing key and a document that fails to parse both come back as
/// `Ok(None)`; the parse failure is logged. Only backend failures are errors.
pub async fn read_document<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(bytes) = store.read(key).await? else {
        debug!(target: "storage::document", key, "No persisted document");
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(
                target: "storage::document",
                key,
                error = %e,
                "Persisted document is corrupt, falling back to defaults"
            );
            Ok(None)
        }
    }
}

pub async fn write_document<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;
    store.write(key, &bytes).await
}

/// In-memory value mirrored to one storage key.
///
/// Mutations are serialised through an async gate: the closure runs against a
/// copy, the copy is persisted, and only then does it replace the live value.
/// A failed write leaves the live value untouched. Subscribers see every
/// committed value exactly once, in commit order.
pub struct PersistedCell<T> {
    key: &'static str,
    backend: Arc<dyn KeyValueStore>,
    value: RwLock<T>,
    gate: tokio::sync::Mutex<()>,
    subscribers: Subscribers<T>,
}

impl<T> PersistedCell<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    pub fn new(key: &'static str, backend: Arc<dyn KeyValueStore>, initial: T) -> Self {
        Self {
            key,
            backend,
            value: RwLock::new(initial),
            gate: tokio::sync::Mutex::new(()),
            subscribers: Subscribers::new(),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn get(&self) -> T {
        self.read(Clone::clone)
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Apply `mutate` and persist the result.
    ///
    /// `mutate` returns `None` to signal that nothing changed, in which case
    /// nothing is written and subscribers are not called.
    pub async fn update<R>(
        &self,
        mutate: impl FnOnce(&mut T) -> Option<R>,
    ) -> Result<Option<R>, StorageError> {
        let _gate = self.gate.lock().await;

        let mut next = self.get();
        let Some(outcome) = mutate(&mut next) else {
            return Ok(None);
        };

        write_document(self.backend.as_ref(), self.key, &next).await?;

        {
            let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
            *guard = next.clone();
        }
        self.subscribers.notify(&next);

        Ok(Some(outcome))
    }
}
