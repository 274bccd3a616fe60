//! The persistence engine.

use crate::cache::SnapshotCache;
use crate::change_feed::{Change, ChangeEvent, ChangeFeed, ModelChange};
use crate::config::PersistenceConfig;
use crate::error::{PersistenceResult, WriteOperation};
use crate::gate::{SaveGate, WriteMode};
use crate::keys::{storage_key, LegacyKeyTable, LAST_LOCAL_SYNC_MODEL_CHANGE_KEY};
use crate::registry::{ModelKind, ModelRegistry};
use crate::repair::repair_entity_collection;
use crate::snapshot::parse_timestamp;
use parking_lot::Mutex;
use planstore_codec::{Compressor, DeflateCompressor};
use planstore_storage::{InMemoryStore, KeyValueStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Returns the current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub(crate) struct Inner {
    /// The key-value store holding all durable state.
    pub(crate) store: Arc<dyn KeyValueStore>,
    /// Codec for archive payloads.
    pub(crate) compressor: Arc<dyn Compressor>,
    /// Declared models.
    pub(crate) registry: ModelRegistry,
    /// Legacy storage names, derived from the registry.
    pub(crate) legacy: LegacyKeyTable,
    /// Engine configuration.
    pub(crate) config: PersistenceConfig,
    /// Import-in-progress flag.
    pub(crate) gate: SaveGate,
    /// Last assembled snapshot body.
    pub(crate) cache: SnapshotCache,
    /// Published changes.
    pub(crate) feed: ChangeFeed,
    /// Serializes read-modify-write of the last-sync-change timestamp.
    timestamp_lock: tokio::sync::Mutex<()>,
    /// Per-key locks serializing `exec_action`.
    action_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Handle to a persistence engine.
///
/// `Persistence` owns the model registry, the save gate, the snapshot cache
/// and the change feed, and routes every read and write to the key-value
/// store. Cloning is cheap; all clones share one engine.
///
/// # Example
///
/// ```rust,ignore
/// use planstore_core::{Persistence, WriteMode};
/// use serde_json::json;
///
/// let persistence = Persistence::in_memory()?;
/// let tags = persistence.project::<serde_json::Value>("note")?;
/// tags.save("p1", &Default::default(), WriteMode::Regular).await?;
///
/// let snapshot = persistence.load_complete().await?;
/// assert!(snapshot.project_value("note", "p1").is_some());
/// ```
#[derive(Clone)]
pub struct Persistence {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("models", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .field("import_in_progress", &self.inner.gate.is_engaged())
            .finish_non_exhaustive()
    }
}

impl Persistence {
    /// Creates an engine over a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured project index key is not a
    /// registered entity model.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        compressor: Arc<dyn Compressor>,
        registry: ModelRegistry,
        config: PersistenceConfig,
    ) -> PersistenceResult<Self> {
        registry.expect(&config.project_index_key, ModelKind::Entity)?;

        let legacy = registry.legacy_keys();
        let feed = ChangeFeed::with_max_history(config.event_history);
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                compressor,
                registry,
                legacy,
                config,
                gate: SaveGate::new(),
                cache: SnapshotCache::new(),
                feed,
                timestamp_lock: tokio::sync::Mutex::new(()),
                action_locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Creates an engine with the task application's models over a store,
    /// using DEFLATE for archives.
    ///
    /// # Errors
    ///
    /// See [`Persistence::new`].
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> PersistenceResult<Self> {
        Self::new(
            store,
            Arc::new(DeflateCompressor::default()),
            ModelRegistry::task_app(),
            PersistenceConfig::default(),
        )
    }

    /// Creates an engine over a fresh [`InMemoryStore`].
    ///
    /// # Errors
    ///
    /// See [`Persistence::new`].
    pub fn in_memory() -> PersistenceResult<Self> {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.store
    }

    /// Returns the model registry.
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PersistenceConfig {
        &self.inner.config
    }

    /// Returns true while an import holds the save gate.
    #[must_use]
    pub fn is_import_in_progress(&self) -> bool {
        self.inner.gate.is_engaged()
    }

    /// Subscribes to change events.
    pub fn subscribe(&self) -> UnboundedReceiver<ChangeEvent> {
        self.inner.feed.subscribe()
    }

    /// Returns retained change events after `cursor`, up to `limit`.
    #[must_use]
    pub fn changes_since(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.inner.feed.poll(cursor, limit)
    }

    /// Returns the sequence number of the latest change event.
    #[must_use]
    pub fn latest_change_sequence(&self) -> u64 {
        self.inner.feed.latest_sequence()
    }

    /// Reads a value by logical key, falling back to its legacy key.
    ///
    /// A stored `null` counts as absent. No migration is applied.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn load_raw(
        &self,
        logical_key: &str,
        project_id: Option<&str>,
    ) -> PersistenceResult<Option<Value>> {
        let key = storage_key(logical_key, project_id);
        let value = self.inner.store.load(&key).await?.filter(|v| !v.is_null());
        if value.is_some() {
            debug!(key = %key, "loaded");
            return Ok(value);
        }

        let Some(legacy_key) = self.inner.legacy.fallback_for(logical_key, project_id) else {
            return Ok(None);
        };
        let value = self
            .inner
            .store
            .load(&legacy_key)
            .await?
            .filter(|v| !v.is_null());
        if value.is_some() {
            debug!(key = %key, legacy_key = %legacy_key, "loaded from legacy key");
        }
        Ok(value)
    }

    /// Reads a model value and, unless `skip_migration` is set, migrates it.
    ///
    /// Unregistered keys are read without migration.
    ///
    /// # Errors
    ///
    /// Propagates store and migration failures.
    pub async fn load_model(
        &self,
        logical_key: &str,
        project_id: Option<&str>,
        skip_migration: bool,
    ) -> PersistenceResult<Option<Value>> {
        let Some(value) = self.load_raw(logical_key, project_id).await? else {
            return Ok(None);
        };
        match self.inner.registry.get(logical_key) {
            Some(spec) if !skip_migration => spec
                .migrator()
                .migrate(value, project_id, logical_key)
                .map(Some),
            _ => Ok(Some(value)),
        }
    }

    /// Writes a value through the save gate.
    ///
    /// For registered collection models the value is repaired first. On
    /// success the cache is patched, a change is published and, for regular
    /// writes, the last-sync-change timestamp is bumped. A failed bump is
    /// logged and does not fail the write. Returns the value as persisted.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WriteBlocked`] for regular writes during
    /// an import; propagates store failures.
    pub async fn save_raw(
        &self,
        logical_key: &str,
        project_id: Option<&str>,
        value: Value,
        mode: WriteMode,
    ) -> PersistenceResult<Value> {
        self.inner.gate.check(logical_key, WriteOperation::Save, mode)?;

        let spec = self.inner.registry.get(logical_key);
        let value = match spec.map(|s| s.kind()) {
            Some(ModelKind::Entity | ModelKind::ProjectScoped) => {
                repair_entity_collection(value, logical_key)
            }
            _ => value,
        };

        let key = storage_key(logical_key, project_id);
        self.inner.store.save(&key, &value).await?;
        debug!(key = %key, import = mode.is_import(), "saved");

        if spec.is_some() {
            self.inner
                .cache
                .patch(logical_key, project_id, Some(value.clone()));
        }
        self.after_write(logical_key, project_id, Some(value.clone()), mode)
            .await;
        Ok(value)
    }

    /// Removes a value through the save gate.
    ///
    /// The legacy key is removed as well so the value cannot reappear
    /// through the read fallback.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WriteBlocked`] for regular removals during
    /// an import; propagates store failures.
    pub async fn remove_raw(
        &self,
        logical_key: &str,
        project_id: Option<&str>,
        mode: WriteMode,
    ) -> PersistenceResult<()> {
        self.inner
            .gate
            .check(logical_key, WriteOperation::Remove, mode)?;

        let key = storage_key(logical_key, project_id);
        self.inner.store.remove(&key).await?;
        if let Some(legacy_key) = self.inner.legacy.fallback_for(logical_key, project_id) {
            self.inner.store.remove(&legacy_key).await?;
        }
        debug!(key = %key, import = mode.is_import(), "removed");

        if self.inner.registry.contains(logical_key) {
            self.inner.cache.patch(logical_key, project_id, None);
        }
        self.after_write(logical_key, project_id, None, mode).await;
        Ok(())
    }

    /// Wipes the whole store and drops the cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WriteBlocked`] for regular wipes during an
    /// import; propagates store failures.
    pub async fn clear_database(&self, mode: WriteMode) -> PersistenceResult<()> {
        self.inner.gate.check("*", WriteOperation::Clear, mode)?;
        self.inner.store.clear_all().await?;
        self.inner.cache.invalidate();
        self.inner.feed.publish(Change::Cleared);
        info!("store cleared");
        Ok(())
    }

    async fn after_write(
        &self,
        logical_key: &str,
        project_id: Option<&str>,
        data: Option<Value>,
        mode: WriteMode,
    ) {
        self.inner.feed.publish(Change::Model(ModelChange {
            logical_key: logical_key.to_string(),
            project_id: project_id.map(str::to_string),
            data,
            is_import: mode.is_import(),
        }));
        if !mode.is_import() && self.inner.config.track_local_changes {
            if let Err(e) = self.touch_last_local_sync_model_change().await {
                warn!(logical_key, error = %e, "failed to bump last local change timestamp");
            }
        }
    }

    /// Returns the stored last-sync-change timestamp.
    ///
    /// Numeric strings are accepted; anything unparseable reads as absent.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn last_local_sync_model_change(&self) -> PersistenceResult<Option<i64>> {
        let raw = self
            .inner
            .store
            .load(LAST_LOCAL_SYNC_MODEL_CHANGE_KEY)
            .await?;
        Ok(raw.as_ref().and_then(parse_timestamp))
    }

    /// Stores the last-sync-change timestamp.
    ///
    /// Not subject to the save gate: imports set it themselves.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn set_last_local_sync_model_change(&self, timestamp: i64) -> PersistenceResult<()> {
        self.inner
            .store
            .save(LAST_LOCAL_SYNC_MODEL_CHANGE_KEY, &Value::from(timestamp))
            .await?;
        Ok(())
    }

    /// Bumps the last-sync-change timestamp to now, keeping it strictly
    /// increasing. Returns the new value.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn touch_last_local_sync_model_change(&self) -> PersistenceResult<i64> {
        let _guard = self.inner.timestamp_lock.lock().await;
        let previous = self.last_local_sync_model_change().await?;
        let now = now_millis();
        let next = previous.map_or(now, |p| now.max(p.saturating_add(1)));
        self.set_last_local_sync_model_change(next).await?;
        Ok(next)
    }

    /// Returns the lock serializing `exec_action` on one logical key.
    pub(crate) fn action_lock(&self, logical_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.action_locks.lock();
        Arc::clone(locks.entry(logical_key.to_string()).or_default())
    }

    /// Returns the archive codec.
    pub(crate) fn compressor(&self) -> &Arc<dyn Compressor> {
        &self.inner.compressor
    }

    /// Checks that a model is registered with the given kind.
    pub(crate) fn expect_model(&self, logical_key: &str, kind: ModelKind) -> PersistenceResult<()> {
        self.inner.registry.expect(logical_key, kind).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_raw() {
        let persistence = Persistence::in_memory().unwrap();
        let value = json!({"theme": "dark"});

        persistence
            .save_raw("globalConfig", None, value.clone(), WriteMode::Regular)
            .await
            .unwrap();
        assert_eq!(
            persistence.load_raw("globalConfig", None).await.unwrap(),
            Some(value)
        );
    }

    #[tokio::test]
    async fn legacy_key_is_read_when_current_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.save("SUP_P_p1_NOTE_STATE", &json!({"ids": ["n"], "entities": {"n": {}}})).await.unwrap();
        store.save("SUP_TAG_STATE", &json!("old")).await.unwrap();
        store.save("tag", &json!(null)).await.unwrap();
        let persistence = Persistence::with_store(store).unwrap();

        let note = persistence.load_raw("note", Some("p1")).await.unwrap();
        assert_eq!(note.unwrap()["ids"], json!(["n"]));
        assert_eq!(persistence.load_raw("tag", None).await.unwrap(), Some(json!("old")));
    }

    #[tokio::test]
    async fn remove_clears_legacy_copy() {
        let store = Arc::new(InMemoryStore::new());
        store.save("SUP_P_p1_NOTE_STATE", &json!({"ids": [], "entities": {}})).await.unwrap();
        let persistence = Persistence::with_store(store.clone()).unwrap();

        persistence.remove_raw("note", Some("p1"), WriteMode::Regular).await.unwrap();
        assert_eq!(persistence.load_raw("note", Some("p1")).await.unwrap(), None);
        assert!(!store.contains_key("SUP_P_p1_NOTE_STATE"));
    }

    #[tokio::test]
    async fn collection_writes_are_repaired() {
        let persistence = Persistence::in_memory().unwrap();
        let saved = persistence
            .save_raw(
                "tag",
                None,
                json!({"ids": ["a", "ghost"], "entities": {"a": {}}}),
                WriteMode::Regular,
            )
            .await
            .unwrap();
        assert_eq!(saved["ids"], json!(["a"]));
    }

    #[tokio::test]
    async fn regular_writes_bump_timestamp() {
        let persistence = Persistence::in_memory().unwrap();
        persistence.set_last_local_sync_model_change(5).await.unwrap();

        persistence
            .save_raw("reminders", None, json!([]), WriteMode::Import)
            .await
            .unwrap();
        assert_eq!(persistence.last_local_sync_model_change().await.unwrap(), Some(5));

        persistence
            .save_raw("reminders", None, json!([]), WriteMode::Regular)
            .await
            .unwrap();
        assert!(persistence.last_local_sync_model_change().await.unwrap().unwrap() > 5);
    }

    #[tokio::test]
    async fn touch_is_strictly_increasing() {
        let persistence = Persistence::in_memory().unwrap();
        let far_future = now_millis() + 60_000;
        persistence.set_last_local_sync_model_change(far_future).await.unwrap();

        let next = persistence.touch_last_local_sync_model_change().await.unwrap();
        assert_eq!(next, far_future + 1);
    }

    #[tokio::test]
    async fn string_timestamps_are_parsed() {
        let store = Arc::new(InMemoryStore::new());
        store.save(LAST_LOCAL_SYNC_MODEL_CHANGE_KEY, &json!("1234")).await.unwrap();
        let persistence = Persistence::with_store(store).unwrap();
        assert_eq!(persistence.last_local_sync_model_change().await.unwrap(), Some(1234));
    }

    #[tokio::test]
    async fn writes_publish_events() {
        let persistence = Persistence::in_memory().unwrap();
        let mut rx = persistence.subscribe();

        persistence
            .save_raw("note", Some("p1"), json!({"ids": [], "entities": {}}), WriteMode::Import)
            .await
            .unwrap();
        persistence.remove_raw("note", Some("p1"), WriteMode::Regular).await.unwrap();

        let Change::Model(saved) = rx.recv().await.unwrap().change else {
            panic!("expected model change");
        };
        assert_eq!(saved.project_id.as_deref(), Some("p1"));
        assert!(saved.is_import);

        let Change::Model(removed) = rx.recv().await.unwrap().change else {
            panic!("expected model change");
        };
        assert!(removed.data.is_none());
        assert_eq!(persistence.latest_change_sequence(), 2);
    }

    #[test]
    fn index_key_must_be_an_entity_model() {
        let config = PersistenceConfig::new().project_index_key("globalConfig");
        let result = Persistence::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(DeflateCompressor::default()),
            ModelRegistry::task_app(),
            config,
        );
        assert!(matches!(result, Err(PersistenceError::WrongModelKind { .. })));
    }
}
