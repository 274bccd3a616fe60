//! # planstore Storage
//!
//! Key-value store trait and implementations for planstore.
//!
//! This crate provides the lowest-level storage abstraction for planstore.
//! Stores are **opaque value stores** addressed by string keys - they do not
//! interpret the JSON documents they hold.
//!
//! ## Design Principles
//!
//! - Stores offer four async primitives: load, save, remove, clear
//! - Each key is read and written atomically; there are no multi-key transactions
//! - No knowledge of models, project scoping, or snapshots
//! - Must be `Send + Sync` so one store can back a shared persistence engine
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral storage
//! - [`FileStore`] - One CBOR file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use planstore_storage::{InMemoryStore, KeyValueStore};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//! store.save("task", &json!({"ids": []})).await.unwrap();
//! assert_eq!(store.load("task").await.unwrap(), Some(json!({"ids": []})));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::KeyValueStore;
