//! Test fixtures and engine helpers.
//!
//! Provides engines over throwaway stores and sample data shaped like the
//! task application's.

use planstore_codec::{Compressor, DeflateCompressor};
use planstore_core::{
    empty_collection, AppData, AppDataComplete, ModelRegistry, ModelSpec, Persistence,
    PersistenceConfig,
};
use planstore_storage::{FileStore, InMemoryStore, KeyValueStore};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// An engine over a throwaway store.
pub struct TestPersistence {
    /// The engine.
    pub persistence: Persistence,
    /// The in-memory store, when not file-backed.
    pub memory: Option<Arc<InMemoryStore>>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestPersistence {
    /// Creates an engine with the task application's models over an
    /// in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(ModelRegistry::task_app(), PersistenceConfig::default())
    }

    /// Creates an engine with a custom registry over an in-memory store.
    pub fn memory_with(registry: ModelRegistry, config: PersistenceConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let persistence = Persistence::new(
            store.clone(),
            Arc::new(DeflateCompressor::default()),
            registry,
            config,
        )
        .expect("Failed to create persistence");
        Self {
            persistence,
            memory: Some(store),
            temp_dir: None,
        }
    }

    /// Creates an engine over a store seeded with raw entries.
    pub fn seeded<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Arc::new(InMemoryStore::with_entries(entries));
        let persistence = Persistence::with_store(store.clone()).expect("Failed to create persistence");
        Self {
            persistence,
            memory: Some(store),
            temp_dir: None,
        }
    }

    /// Creates an engine with the task application's models over a file
    /// store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&temp_dir.path().join("store")).expect("Failed to open file store");
        let persistence = Persistence::with_store(Arc::new(store)).expect("Failed to create persistence");
        Self {
            persistence,
            memory: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Creates an engine over any store and codec.
    pub fn with_parts(store: Arc<dyn KeyValueStore>, compressor: Arc<dyn Compressor>) -> Self {
        let persistence = Persistence::new(
            store,
            compressor,
            ModelRegistry::task_app(),
            PersistenceConfig::default(),
        )
        .expect("Failed to create persistence");
        Self {
            persistence,
            memory: None,
            temp_dir: None,
        }
    }

    /// Returns the store directory of a file-backed engine.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("store"))
    }

    /// Returns the raw entries of an in-memory store.
    pub fn raw_entries(&self) -> Vec<(String, Value)> {
        self.memory
            .as_ref()
            .map(|store| store.entries().into_iter().collect())
            .unwrap_or_default()
    }
}

/// Builds a consistent collection from `(id, entity)` pairs.
pub fn collection<I, K>(entities: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let mut ids = Vec::new();
    let mut map = Map::new();
    for (id, entity) in entities {
        let id = id.into();
        ids.push(Value::String(id.clone()));
        map.insert(id, entity);
    }
    json!({ "ids": ids, "entities": map })
}

/// Builds a project collection listing the given ids.
pub fn project_collection(ids: &[&str]) -> Value {
    collection(
        ids.iter()
            .map(|id| (*id, json!({ "id": id, "title": format!("Project {id}") }))),
    )
}

/// Builds a task collection with one task per id.
pub fn task_collection(project_id: &str, ids: &[&str]) -> Value {
    collection(ids.iter().map(|id| {
        (
            *id,
            json!({ "id": id, "title": format!("Task {id}"), "projectId": project_id }),
        )
    }))
}

/// Builds a note collection with one note per id.
pub fn note_collection(ids: &[&str]) -> Value {
    collection(
        ids.iter()
            .map(|id| (*id, json!({ "id": id, "content": format!("Note {id}") }))),
    )
}

/// A registry where tasks are project-scoped.
///
/// Used to check per-project assembly of a collection that the task
/// application keeps global.
pub fn project_task_registry() -> ModelRegistry {
    ModelRegistry::from_specs([
        ModelSpec::scalar("globalConfig", json!({})),
        ModelSpec::entity("project"),
        ModelSpec::project_scoped("task"),
        ModelSpec::project_scoped("note"),
    ])
    .expect("Failed to build registry")
}

/// A complete snapshot with projects `p1` and `p2`, tasks, and notes for both.
pub fn two_project_snapshot() -> AppDataComplete {
    let data: AppData = [
        ("globalConfig".to_string(), json!({ "lang": "en" })),
        ("reminders".to_string(), json!([])),
        ("project".to_string(), project_collection(&["p1", "p2"])),
        ("tag".to_string(), collection([("urgent", json!({ "title": "urgent" }))])),
        ("simpleCounter".to_string(), empty_collection()),
        ("task".to_string(), task_collection("p1", &["t1", "t2"])),
        ("taskArchive".to_string(), empty_collection()),
        ("taskRepeatCfg".to_string(), empty_collection()),
        (
            "note".to_string(),
            json!({ "p1": note_collection(&["n1"]), "p2": note_collection(&["n2", "n3"]) }),
        ),
        ("bookmark".to_string(), json!({ "p1": empty_collection() })),
        ("metric".to_string(), json!({})),
        ("improvement".to_string(), json!({})),
        ("obstruction".to_string(), json!({})),
    ]
    .into_iter()
    .collect();
    AppDataComplete::new(data).with_timestamp(Some(1_700_000_000_000))
}
