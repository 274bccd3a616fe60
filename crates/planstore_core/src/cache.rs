//! In-memory snapshot cache.
//!
//! Holds the last assembled [`AppData`] behind an `Arc`. The cached value is
//! never mutated in place: a write produces a patched copy and swaps it in,
//! so readers holding the previous `Arc` keep a consistent view.
//!
//! Every change bumps a generation counter. An assembly that started before
//! a change stores its result only if no change happened meanwhile.

use crate::snapshot::AppData;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Slot {
    data: Option<Arc<AppData>>,
    generation: u64,
}

/// The cached complete snapshot body.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    slot: RwLock<Slot>,
}

impl SnapshotCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached snapshot, if populated.
    #[must_use]
    pub fn get(&self) -> Option<Arc<AppData>> {
        self.slot.read().data.clone()
    }

    /// Returns true if a snapshot is cached.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.slot.read().data.is_some()
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.read().generation
    }

    /// Replaces the cached snapshot wholesale.
    pub fn replace(&self, data: Arc<AppData>) {
        let mut slot = self.slot.write();
        slot.generation += 1;
        slot.data = Some(data);
    }

    /// Stores an assembled snapshot unless the cache changed since
    /// `generation` was read.
    ///
    /// Returns the snapshot callers should use: the stored one, or the
    /// fresh one if it was discarded.
    pub fn store_if_current(&self, generation: u64, data: AppData) -> Arc<AppData> {
        let data = Arc::new(data);
        let mut slot = self.slot.write();
        if slot.generation == generation {
            slot.data = Some(Arc::clone(&data));
        }
        data
    }

    /// Applies one write to the cached snapshot.
    ///
    /// Does nothing but bump the generation while the cache is empty.
    pub fn patch(&self, logical_key: &str, project_id: Option<&str>, value: Option<Value>) {
        let mut slot = self.slot.write();
        slot.generation += 1;
        if let Some(current) = &slot.data {
            let next = current.with_value(logical_key, project_id, value);
            slot.data = Some(Arc::new(next));
        }
    }

    /// Drops the cached snapshot.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write();
        slot.generation += 1;
        slot.data = None;
    }
}
