//! Load-time schema migration.
//!
//! Every model carries a [`Migrator`] that turns whatever shape is stored
//! into the current shape. Migrations run once per load and are never
//! written back on their own: the migrated value is persisted only by the
//! next explicit save.
//!
//! ## Versioned migrations
//!
//! [`VersionedMigrator`] chains numbered steps. The version a stored value
//! has reached is kept inside the value itself, in the
//! [`MODEL_VERSION_FIELD`] of object-shaped states:
//!
//! ```
//! use planstore_core::migration::{Migrator, VersionedMigrator};
//! use serde_json::{json, Value};
//!
//! let migrator = VersionedMigrator::new()
//!     .step(1, "rename_title", |mut state: Value, _pid: Option<&str>| {
//!         if let Some(obj) = state.as_object_mut() {
//!             if let Some(title) = obj.remove("name") {
//!                 obj.insert("title".into(), title);
//!             }
//!         }
//!         Ok(state)
//!     })
//!     .unwrap();
//!
//! let migrated = migrator.migrate(json!({"name": "x"}), None, "cfg").unwrap();
//! assert_eq!(migrated, json!({"title": "x", "__modelVersion": 1}));
//! ```

use crate::error::{PersistenceError, PersistenceResult};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Version number of a migration step.
pub type MigrationVersion = u64;

/// Field holding the migration version inside object-shaped states.
pub const MODEL_VERSION_FIELD: &str = "__modelVersion";

/// Converts a stored state into the current shape.
///
/// Implemented for closures `Fn(Value, Option<&str>) -> PersistenceResult<Value>`,
/// where the second argument is the project id for project-scoped models.
pub trait Migrator: Send + Sync {
    /// Migrates `state`, loaded for `logical_key` (and `project_id`, if
    /// project-scoped).
    ///
    /// # Errors
    ///
    /// Returns an error if the stored state cannot be brought to the
    /// current shape.
    fn migrate(
        &self,
        state: Value,
        project_id: Option<&str>,
        logical_key: &str,
    ) -> PersistenceResult<Value>;
}

impl<F> Migrator for F
where
    F: Fn(Value, Option<&str>) -> PersistenceResult<Value> + Send + Sync,
{
    fn migrate(
        &self,
        state: Value,
        project_id: Option<&str>,
        _logical_key: &str,
    ) -> PersistenceResult<Value> {
        self(state, project_id)
    }
}

/// The default migrator: returns the stored state unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMigrator;

impl Migrator for IdentityMigrator {
    fn migrate(&self, state: Value, _: Option<&str>, _: &str) -> PersistenceResult<Value> {
        Ok(state)
    }
}

type StepFn = Box<dyn Fn(Value, Option<&str>) -> PersistenceResult<Value> + Send + Sync>;

struct MigrationStep {
    name: String,
    apply: StepFn,
}

/// Information about a registered migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version number.
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
}

/// A migrator that applies numbered steps in order.
///
/// Steps whose version is above the version recorded in the state run in
/// ascending order; afterwards the state is stamped with the latest version.
/// States that are not JSON objects cannot carry a version and always run
/// every step.
#[derive(Default)]
pub struct VersionedMigrator {
    steps: BTreeMap<MigrationVersion, MigrationStep>,
}

impl std::fmt::Debug for VersionedMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedMigrator")
            .field("steps", &self.list())
            .finish()
    }
}

impl VersionedMigrator {
    /// Creates a migrator with no steps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is 0 or already registered.
    pub fn step<F>(
        mut self,
        version: MigrationVersion,
        name: &str,
        apply: F,
    ) -> PersistenceResult<Self>
    where
        F: Fn(Value, Option<&str>) -> PersistenceResult<Value> + Send + Sync + 'static,
    {
        if version == 0 {
            return Err(PersistenceError::migration(
                name,
                "migration versions start at 1",
            ));
        }
        if self.steps.contains_key(&version) {
            return Err(PersistenceError::migration(
                name,
                format!("migration version {version} already registered"),
            ));
        }
        self.steps.insert(
            version,
            MigrationStep {
                name: name.to_string(),
                apply: Box::new(apply),
            },
        );
        Ok(self)
    }

    /// Returns the registered steps in order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.steps
            .iter()
            .map(|(version, step)| MigrationInfo {
                version: *version,
                name: step.name.clone(),
            })
            .collect()
    }

    /// Returns the highest registered version, or 0 without steps.
    #[must_use]
    pub fn latest_version(&self) -> MigrationVersion {
        self.steps.keys().next_back().copied().unwrap_or(0)
    }

    /// Returns the version recorded in a stored state.
    #[must_use]
    pub fn version_of(state: &Value) -> MigrationVersion {
        state
            .get(MODEL_VERSION_FIELD)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

impl Migrator for VersionedMigrator {
    fn migrate(
        &self,
        mut state: Value,
        project_id: Option<&str>,
        logical_key: &str,
    ) -> PersistenceResult<Value> {
        let current = Self::version_of(&state);
        let latest = self.latest_version();
        if current >= latest {
            return Ok(state);
        }

        for (version, step) in self.steps.range(current + 1..) {
            debug!(logical_key, version, step = %step.name, "applying migration step");
            state = (step.apply)(state, project_id).map_err(|e| {
                PersistenceError::migration(
                    logical_key,
                    format!("step {version} ({}) failed: {e}", step.name),
                )
            })?;
        }

        if let Some(obj) = state.as_object_mut() {
            obj.insert(MODEL_VERSION_FIELD.to_string(), Value::from(latest));
        }
        Ok(state)
    }
}
