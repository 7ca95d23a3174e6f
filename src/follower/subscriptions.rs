//! Subscription bookkeeping.
//!
//! Two tables, each behind its own lock:
//! - the registry (`key -> reg`, never shrinks) plus the last value pushed for
//!   each key
//! - the listeners of each key
//!
//! Listeners are cloned out of the table and called after the lock is released,
//! so a listener may subscribe again without deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

/// Callback receiving every value pushed for a key.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Topics subscribed upstream and their latest values.
#[derive(Debug, Default)]
pub struct Registry {
    topics: HashMap<String, Value>,
    cache: HashMap<String, Value>,
}

impl Registry {
    /// Record `key` as subscribed. Returns `false` if it already was.
    pub fn insert(&mut self, key: &str, reg: &Value) -> bool {
        if self.topics.contains_key(key) {
            return false;
        }
        self.topics.insert(key.to_string(), reg.clone());
        true
    }

    /// Whether `key` has been subscribed upstream.
    pub fn contains(&self, key: &str) -> bool {
        self.topics.contains_key(key)
    }

    /// Last value pushed for `key`.
    pub fn cached(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    /// Every subscribed `(key, reg)` pair.
    pub fn topics(&self) -> Vec<(String, Value)> {
        self.topics
            .iter()
            .map(|(key, reg)| (key.clone(), reg.clone()))
            .collect()
    }

    /// Number of subscribed keys.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    registry: Mutex<Registry>,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl Subscriptions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the registry locked.
    pub(crate) fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut lock(&self.registry))
    }

    pub(crate) fn add_listener(&self, key: &str, listener: Listener) {
        lock(&self.listeners)
            .entry(key.to_string())
            .or_default()
            .push(listener);
    }

    /// Store a pushed value and return the listeners to notify.
    pub(crate) fn update(&self, key: &str, value: Value) -> Vec<Listener> {
        lock(&self.registry).cache.insert(key.to_string(), value);
        lock(&self.listeners).get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn cached(&self, key: &str) -> Option<Value> {
        lock(&self.registry).cached(key).cloned()
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, key: &str) -> usize {
        lock(&self.listeners).get(key).map_or(0, Vec::len)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
