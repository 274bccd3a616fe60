//! Fault injection for failure-path tests.
//!
//! [`FaultyStore`] wraps an [`InMemoryStore`] and fails chosen operations
//! on chosen keys. Faults can be armed and disarmed at any time, so a test
//! can let setup succeed and break only the operation under test.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use planstore_testkit::fault::{FaultyStore, StoreOp};
//!
//! let store = Arc::new(FaultyStore::new());
//! store.fail_on(StoreOp::Save, "p__p1__note");
//! // every save of that key now returns StoreError::Backend
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use planstore_storage::{InMemoryStore, KeyValueStore, StoreError, StoreResult};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `load`
    Load,
    /// `save`
    Save,
    /// `remove`
    Remove,
    /// `clear_all`
    Clear,
}

/// Which keys a fault applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyMatch {
    Exact(String),
    Prefix(String),
    Any,
}

impl KeyMatch {
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(k) => k == key,
            Self::Prefix(p) => key.starts_with(p.as_str()),
            Self::Any => true,
        }
    }
}

/// An in-memory store with injectable failures.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    faults: RwLock<HashSet<(StoreOp, KeyMatch)>>,
    injected: AtomicUsize,
}

impl FaultyStore {
    /// Creates an empty store with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Fails `op` on exactly `key`.
    pub fn fail_on(&self, op: StoreOp, key: &str) {
        self.faults.write().insert((op, KeyMatch::Exact(key.to_string())));
    }

    /// Fails `op` on every key starting with `prefix`.
    pub fn fail_on_prefix(&self, op: StoreOp, prefix: &str) {
        self.faults
            .write()
            .insert((op, KeyMatch::Prefix(prefix.to_string())));
    }

    /// Fails `op` on every key.
    pub fn fail_all(&self, op: StoreOp) {
        self.faults.write().insert((op, KeyMatch::Any));
    }

    /// Disarms all faults.
    pub fn heal(&self) {
        self.faults.write().clear();
    }

    /// Returns how many failures were injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn check(&self, op: StoreOp, key: &str) -> StoreResult<()> {
        let hit = self
            .faults
            .read()
            .iter()
            .any(|(o, m)| *o == op && m.matches(key));
        if hit {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::backend(format!("injected {op:?} failure on {key:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        self.check(StoreOp::Load, key)?;
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.check(StoreOp::Save, key)?;
        self.inner.save(key, value).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check(StoreOp::Remove, key)?;
        self.inner.remove(key).await
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.check(StoreOp::Clear, "*")?;
        self.inner.clear_all().await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys().await
    }
}
