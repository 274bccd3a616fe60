//! # planstore Core
//!
//! Local-first persistence engine for a task-management application.
//!
//! This crate provides:
//! - A registry of persisted models: global scalars, global entity
//!   collections and per-project collections
//! - Storage addressing with read-only fallback to legacy keys
//! - Load-time migrations
//! - Complete snapshot assembly and atomic import, guarded by a save gate
//! - Project archives, compressed with a pluggable codec
//! - Backups and store compaction
//! - An in-memory snapshot cache and a change feed
//!
//! ## Example
//!
//! ```rust,ignore
//! use planstore_core::{EntityState, Persistence, PersistenceResult};
//! use serde_json::{json, Value};
//!
//! let persistence = Persistence::in_memory()?;
//! let tags = persistence.entity("tag", |mut state: EntityState<Value>, title: String| {
//!     state.insert(title.clone(), json!({ "title": title }));
//!     PersistenceResult::Ok(state)
//! })?;
//!
//! tags.exec_action("urgent".to_string()).await?;
//! let snapshot = persistence.load_complete().await?;
//! assert_eq!(snapshot.get("tag").unwrap()["ids"], json!(["urgent"]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod backup;
mod cache;
mod change_feed;
mod complete;
mod config;
mod error;
mod gate;
pub mod keys;
pub mod migration;
mod models;
mod persistence;
mod registry;
pub mod repair;
mod snapshot;
mod state;
mod stream;

pub use archive::ProjectArchive;
pub use cache::SnapshotCache;
pub use change_feed::{Change, ChangeEvent, ChangeFeed, ModelChange};
pub use config::PersistenceConfig;
pub use error::{PersistenceError, PersistenceResult, WriteOperation};
pub use gate::{SaveGate, SaveGateGuard, WriteMode};
pub use keys::{storage_key, LegacyKey, LegacyKeyTable};
pub use migration::{IdentityMigrator, Migrator, VersionedMigrator};
pub use models::{EntityModel, LoadMode, ProjectModel, Reducer, ScalarModel};
pub use persistence::Persistence;
pub use registry::{empty_collection, ModelKind, ModelRegistry, ModelSpec};
pub use repair::repair_entity_collection;
pub use snapshot::{
    parse_timestamp, AppData, AppDataComplete, ExportedProject, ImportReport, RelatedModels,
};
pub use state::EntityState;
pub use stream::CompleteStream;

/// Re-exported store and codec crates.
pub use planstore_codec as codec;
pub use planstore_storage as storage;
