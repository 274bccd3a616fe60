//! The model registry.
//!
//! A [`ModelRegistry`] is built once when the engine starts. Each entry is a
//! [`ModelSpec`] tagged with its [`ModelKind`], and carries the logical key,
//! the legacy storage name (if any), the default value substituted when
//! nothing is stored, and the [`Migrator`] applied on load.

use crate::error::{PersistenceError, PersistenceResult};
use crate::keys::{legacy, logical, LegacyKey, LegacyKeyTable};
use crate::migration::{IdentityMigrator, Migrator};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The kind of a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// A single global value.
    Scalar,
    /// A global entity collection.
    Entity,
    /// One entity collection per project.
    ProjectScoped,
}

impl ModelKind {
    /// Returns true for global (non project-scoped) models.
    #[must_use]
    pub const fn is_base(self) -> bool {
        matches!(self, Self::Scalar | Self::Entity)
    }
}

/// Returns the empty entity collection `{"ids": [], "entities": {}}`.
#[must_use]
pub fn empty_collection() -> Value {
    json!({ "ids": [], "entities": {} })
}

/// Declaration of one persisted model.
#[derive(Clone)]
pub struct ModelSpec {
    kind: ModelKind,
    logical_key: String,
    legacy_key: Option<LegacyKey>,
    default_value: Value,
    migrator: Arc<dyn Migrator>,
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("kind", &self.kind)
            .field("logical_key", &self.logical_key)
            .field("legacy_key", &self.legacy_key)
            .field("default_value", &self.default_value)
            .finish_non_exhaustive()
    }
}

impl ModelSpec {
    fn new(kind: ModelKind, logical_key: impl Into<String>, default_value: Value) -> Self {
        Self {
            kind,
            logical_key: logical_key.into(),
            legacy_key: None,
            default_value,
            migrator: Arc::new(IdentityMigrator),
        }
    }

    /// Declares a global scalar model with the value used when nothing is stored.
    #[must_use]
    pub fn scalar(logical_key: impl Into<String>, default_value: Value) -> Self {
        Self::new(ModelKind::Scalar, logical_key, default_value)
    }

    /// Declares a global entity collection.
    #[must_use]
    pub fn entity(logical_key: impl Into<String>) -> Self {
        Self::new(ModelKind::Entity, logical_key, empty_collection())
    }

    /// Declares a per-project entity collection.
    #[must_use]
    pub fn project_scoped(logical_key: impl Into<String>) -> Self {
        Self::new(ModelKind::ProjectScoped, logical_key, empty_collection())
    }

    /// Sets the legacy storage name read when the current key holds nothing.
    #[must_use]
    pub fn legacy(mut self, legacy_key: LegacyKey) -> Self {
        self.legacy_key = Some(legacy_key);
        self
    }

    /// Sets the migrator applied on load.
    #[must_use]
    pub fn migrate(mut self, migrator: impl Migrator + 'static) -> Self {
        self.migrator = Arc::new(migrator);
        self
    }

    /// Returns the model kind.
    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Returns the logical key.
    #[must_use]
    pub fn logical_key(&self) -> &str {
        &self.logical_key
    }

    /// Returns the legacy storage name, if any.
    #[must_use]
    pub fn legacy_key(&self) -> Option<&LegacyKey> {
        self.legacy_key.as_ref()
    }

    /// Returns the value substituted when nothing is stored.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    /// Returns the migrator.
    #[must_use]
    pub fn migrator(&self) -> &Arc<dyn Migrator> {
        &self.migrator
    }
}

/// The set of declared models, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
    by_key: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a list of declarations.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::DuplicateModel`] if two declarations
    /// share a logical key.
    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> PersistenceResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// The model set of the task application.
    #[must_use]
    pub fn task_app() -> Self {
        let global = |key: &str| LegacyKey::Global(key.to_string());
        let scoped = |key: &str| LegacyKey::ProjectScoped(key.to_string());

        let specs = [
            ModelSpec::scalar(logical::GLOBAL_CONFIG, json!({})).legacy(global(legacy::GLOBAL_CFG)),
            ModelSpec::scalar(logical::REMINDERS, json!([])).legacy(global(legacy::REMINDER)),
            ModelSpec::entity(logical::PROJECT).legacy(global(legacy::PROJECT_META_LIST)),
            ModelSpec::entity(logical::TAG).legacy(global(legacy::TAG_STATE)),
            ModelSpec::entity(logical::SIMPLE_COUNTER)
                .legacy(global(legacy::SIMPLE_COUNTER_STATE)),
            ModelSpec::entity(logical::TASK).legacy(global(legacy::TASK_STATE)),
            ModelSpec::entity(logical::TASK_ARCHIVE).legacy(global(legacy::TASK_ARCHIVE)),
            ModelSpec::entity(logical::TASK_REPEAT_CFG)
                .legacy(global(legacy::TASK_REPEAT_CFG_STATE)),
            ModelSpec::project_scoped(logical::BOOKMARK).legacy(scoped(legacy::BOOKMARK_STATE)),
            ModelSpec::project_scoped(logical::NOTE).legacy(scoped(legacy::NOTE_STATE)),
            ModelSpec::project_scoped(logical::METRIC).legacy(scoped(legacy::METRIC_STATE)),
            ModelSpec::project_scoped(logical::IMPROVEMENT)
                .legacy(scoped(legacy::IMPROVEMENT_STATE)),
            ModelSpec::project_scoped(logical::OBSTRUCTION)
                .legacy(scoped(legacy::OBSTRUCTION_STATE)),
        ];

        let mut registry = Self::new();
        for spec in specs {
            registry.by_key.insert(spec.logical_key.clone(), registry.specs.len());
            registry.specs.push(spec);
        }
        registry
    }

    /// Adds a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::DuplicateModel`] if the logical key is
    /// already registered.
    pub fn register(&mut self, spec: ModelSpec) -> PersistenceResult<()> {
        if self.by_key.contains_key(spec.logical_key()) {
            return Err(PersistenceError::DuplicateModel {
                key: spec.logical_key.clone(),
            });
        }
        self.by_key.insert(spec.logical_key.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Replaces the migrator of a registered model.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::UnknownModel`] if the key is not registered.
    pub fn set_migrator(
        &mut self,
        logical_key: &str,
        migrator: impl Migrator + 'static,
    ) -> PersistenceResult<()> {
        let idx = *self
            .by_key
            .get(logical_key)
            .ok_or_else(|| PersistenceError::unknown_model(logical_key))?;
        self.specs[idx].migrator = Arc::new(migrator);
        Ok(())
    }

    /// Looks up a declaration.
    #[must_use]
    pub fn get(&self, logical_key: &str) -> Option<&ModelSpec> {
        self.by_key.get(logical_key).map(|&idx| &self.specs[idx])
    }

    /// Looks up a declaration and checks its kind.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::UnknownModel`] or
    /// [`PersistenceError::WrongModelKind`].
    pub fn expect(&self, logical_key: &str, expected: ModelKind) -> PersistenceResult<&ModelSpec> {
        let spec = self
            .get(logical_key)
            .ok_or_else(|| PersistenceError::unknown_model(logical_key))?;
        if spec.kind != expected {
            return Err(PersistenceError::WrongModelKind {
                key: logical_key.to_string(),
                expected,
                actual: spec.kind,
            });
        }
        Ok(spec)
    }

    /// Returns true if the logical key is registered.
    #[must_use]
    pub fn contains(&self, logical_key: &str) -> bool {
        self.by_key.contains_key(logical_key)
    }

    /// Iterates over all declarations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.specs.iter()
    }

    /// Iterates over global models (scalars and entity collections).
    pub fn base_models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.specs.iter().filter(|s| s.kind.is_base())
    }

    /// Iterates over project-scoped models.
    pub fn project_models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.specs
            .iter()
            .filter(|s| s.kind == ModelKind::ProjectScoped)
    }

    /// Builds the legacy key table of all models plus non-model values.
    #[must_use]
    pub fn legacy_keys(&self) -> LegacyKeyTable {
        let mut table = LegacyKeyTable::with_defaults();
        for spec in &self.specs {
            if let Some(legacy_key) = &spec.legacy_key {
                table.insert(spec.logical_key.clone(), legacy_key.clone());
            }
        }
        table
    }

    /// Returns the number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PROJECT_ARCHIVE_KEY;

    #[test]
    fn task_app_model_set() {
        let registry = ModelRegistry::task_app();
        assert_eq!(registry.len(), 13);
        assert_eq!(registry.base_models().count(), 8);

        let scoped: Vec<_> = registry.project_models().map(ModelSpec::logical_key).collect();
        assert_eq!(
            scoped,
            vec!["bookmark", "note", "metric", "improvement", "obstruction"]
        );
        assert_eq!(
            registry.get("reminders").unwrap().default_value(),
            &json!([])
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = ModelRegistry::from_specs([ModelSpec::entity("tag"), ModelSpec::entity("tag")]);
        assert!(matches!(
            result,
            Err(PersistenceError::DuplicateModel { key }) if key == "tag"
        ));
    }

    #[test]
    fn expect_checks_kind() {
        let registry = ModelRegistry::task_app();
        assert!(registry.expect("note", ModelKind::ProjectScoped).is_ok());
        assert!(matches!(
            registry.expect("note", ModelKind::Entity),
            Err(PersistenceError::WrongModelKind { .. })
        ));
        assert!(matches!(
            registry.expect("missing", ModelKind::Entity),
            Err(PersistenceError::UnknownModel { .. })
        ));
    }

    #[test]
    fn legacy_table_covers_models_and_archive() {
        let table = ModelRegistry::task_app().legacy_keys();
        assert_eq!(
            table.fallback_for("note", Some("p1")).as_deref(),
            Some("SUP_P_p1_NOTE_STATE")
        );
        assert_eq!(
            table.fallback_for("globalConfig", None).as_deref(),
            Some("SUP_GLOBAL_CFG")
        );
        assert!(table.get(PROJECT_ARCHIVE_KEY).is_some());
    }

    #[test]
    fn set_migrator_replaces() {
        let mut registry = ModelRegistry::from_specs([ModelSpec::scalar("cfg", json!({}))]).unwrap();
        registry
            .set_migrator("cfg", |_: Value, _: Option<&str>| -> PersistenceResult<Value> {
                Ok(json!({"v": 2}))
            })
            .unwrap();

        let migrated = registry
            .get("cfg")
            .unwrap()
            .migrator()
            .migrate(json!({}), None, "cfg")
            .unwrap();
        assert_eq!(migrated, json!({"v": 2}));
        assert!(registry.set_migrator("nope", IdentityMigrator).is_err());
    }
}
