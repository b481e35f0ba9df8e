// SPDX-License-Identifier: MIT

//! Run-scoped key/value store shared by every executor of one run.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Async key/value store scoped to one workflow run.
///
/// Writers do read-modify-write without optimistic checks; a key is expected
/// to have a single owning executor.
#[derive(Clone, Default)]
pub struct SharedState {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().await;
        values.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let mut values = self.values.write().await;
        values.insert(key.into(), value);
    }

    pub async fn delete(&self, key: &str) -> Option<Value> {
        let mut values = self.values.write().await;
        values.remove(key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    /// Apply `f` to the value under `key` while holding the write lock
    pub async fn update<F>(&self, key: &str, f: F)
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        let mut values = self.values.write().await;
        let current = values.remove(key);
        if let Some(next) = f(current) {
            values.insert(key.to_string(), next);
        }
    }

    /// Copy of every entry, for checkpoints
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().await.clone()
    }

    /// Replace all entries, used when restoring a checkpoint
    pub async fn restore(&self, entries: HashMap<String, Value>) {
        let mut values = self.values.write().await;
        *values = entries;
    }

    pub async fn clear(&self) {
        self.values.write().await.clear();
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState").finish_non_exhaustive()
    }
}
