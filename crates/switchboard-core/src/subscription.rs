//! Synchronous change notifications for the persisted stores.
//!
//! Every store owns a [`Subscribers`] list. Callbacks run on the task that
//! committed the mutation, after the new value is visible to readers, and
//! never while a store lock is held.

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SubscriberList<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

pub struct Subscribers<T> {
    inner: Arc<Mutex<SubscriberList<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubscriberList {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = list.next_id;
            list.next_id += 1;
            list.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<SubscriberList<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut list = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    list.callbacks.retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    pub fn notify(&self, value: &T) {
        // Snapshot first so a callback may subscribe or unsubscribe without deadlocking.
        let callbacks: Vec<Callback<T>> = {
            let list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            list.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`. Dropping it unregisters the callback.
#[must_use = "dropping a Subscription immediately unregisters the callback"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keep the callback registered for the lifetime of the store.
    pub fn detach(mut self) {
        self.unsubscribe.take();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}
