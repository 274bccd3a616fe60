//! In-memory key-value store for testing.

use crate::error::StoreResult;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// An in-memory key-value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sessions that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
///
/// # Example
///
/// ```rust
/// use planstore_storage::{InMemoryStore, KeyValueStore};
/// use serde_json::json;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = InMemoryStore::new();
/// store.save("reminders", &json!([])).await.unwrap();
/// assert_eq!(store.len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with entries.
    ///
    /// Useful for seeding legacy keys in migration tests.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, Value> {
        self.entries.read().clone()
    }

    /// Returns true if a value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_save_then_load() {
        let store = InMemoryStore::new();
        store.save("task", &json!({"ids": ["a"]})).await.unwrap();

        let loaded = store.load("task").await.unwrap();
        assert_eq!(loaded, Some(json!({"ids": ["a"]})));
    }

    #[tokio::test]
    async fn memory_load_missing_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.load("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_save_overwrites() {
        let store = InMemoryStore::new();
        store.save("k", &json!(1)).await.unwrap();
        store.save("k", &json!(2)).await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn memory_remove_missing_succeeds() {
        let store = InMemoryStore::new();
        store.remove("never-saved").await.unwrap();
    }

    #[tokio::test]
    async fn memory_clear_all() {
        let store = InMemoryStore::with_entries([("a", json!(1)), ("b", json!(2))]);
        assert_eq!(store.len(), 2);

        store.clear_all().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_keys_are_sorted() {
        let store = InMemoryStore::with_entries([("b", json!(1)), ("a", json!(2))]);
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
    }
}
