//! Key-value store trait definition.

use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::Value;

/// A client-side key-value store for planstore.
///
/// Stores are **opaque document stores**. They load, save and remove one
/// JSON document per string key. planstore owns all key addressing and
/// value interpretation - stores do not understand models or snapshots.
///
/// # Invariants
///
/// - `load` returns exactly the value last passed to `save` for that key
/// - `load` returns `None` for a key that was never saved or was removed
/// - `remove` of an absent key succeeds
/// - A single key is read and written atomically
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Loads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be read or decoded.
    async fn load(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or written.
    async fn save(&self, key: &str, value: &Value) -> StoreResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying delete fails.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Removes every key from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails. The store may then be
    /// partially cleared.
    async fn clear_all(&self) -> StoreResult<()>;

    /// Lists all keys currently stored, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    async fn keys(&self) -> StoreResult<Vec<String>>;
}
