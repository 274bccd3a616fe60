//! Storage addressing.
//!
//! Every persisted value has a **logical key** (`"task"`, `"note"`, ...) and a
//! **storage key** derived from it:
//!
//! ```text
//! global model          <logicalKey>                  e.g. task
//! project-scoped model  p__<projectId>__<logicalKey>  e.g. p__p1__note
//! ```
//!
//! Older installations stored the same data under different names. Those
//! names live in one finite [`LegacyKeyTable`] and are only ever read, as a
//! fallback when the current storage key holds nothing.

use std::collections::BTreeMap;

/// Prefix of project-scoped storage keys.
pub const PROJECT_KEY_PREFIX: &str = "p__";
/// Separator between project id and logical key.
pub const PROJECT_KEY_SEPARATOR: &str = "__";

/// Storage key of the complete backup snapshot.
pub const BACKUP_KEY: &str = "SUP_COMPLETE_BACKUP";
/// Storage key of the last-sync-change timestamp.
pub const LAST_LOCAL_SYNC_MODEL_CHANGE_KEY: &str = "SUP_LAST_LOCAL_SYNC_MODEL_CHANGE";
/// Logical key of the project archive.
pub const PROJECT_ARCHIVE_KEY: &str = "archivedProjects";

/// Logical keys of the task application's models.
pub mod logical {
    /// Global configuration.
    pub const GLOBAL_CONFIG: &str = "globalConfig";
    /// Reminder list.
    pub const REMINDERS: &str = "reminders";
    /// Project collection (the project index).
    pub const PROJECT: &str = "project";
    /// Tag collection.
    pub const TAG: &str = "tag";
    /// Simple counter collection.
    pub const SIMPLE_COUNTER: &str = "simpleCounter";
    /// Task collection.
    pub const TASK: &str = "task";
    /// Archived task collection.
    pub const TASK_ARCHIVE: &str = "taskArchive";
    /// Repeating task configuration collection.
    pub const TASK_REPEAT_CFG: &str = "taskRepeatCfg";
    /// Per-project bookmarks.
    pub const BOOKMARK: &str = "bookmark";
    /// Per-project notes.
    pub const NOTE: &str = "note";
    /// Per-project metrics.
    pub const METRIC: &str = "metric";
    /// Per-project improvements.
    pub const IMPROVEMENT: &str = "improvement";
    /// Per-project obstructions.
    pub const OBSTRUCTION: &str = "obstruction";
}

/// Storage names used by earlier releases.
pub mod legacy {
    /// Prefix of legacy project-scoped keys.
    pub const PROJECT_PREFIX: &str = "SUP_P_";

    /// Global configuration.
    pub const GLOBAL_CFG: &str = "SUP_GLOBAL_CFG";
    /// Reminder list.
    pub const REMINDER: &str = "SUP_REMINDER";
    /// Project collection.
    pub const PROJECT_META_LIST: &str = "SUP_PROJECT_META_LIST";
    /// Project archive.
    pub const PROJECT_ARCHIVE: &str = "SUP_PROJECT_ARCHIVE";
    /// Tag collection.
    pub const TAG_STATE: &str = "SUP_TAG_STATE";
    /// Simple counter collection.
    pub const SIMPLE_COUNTER_STATE: &str = "SUP_SIMPLE_COUNTER_STATE";
    /// Task collection.
    pub const TASK_STATE: &str = "SUP_TASK_STATE";
    /// Archived task collection.
    pub const TASK_ARCHIVE: &str = "SUP_TASK_ARCHIVE";
    /// Repeating task configuration collection.
    pub const TASK_REPEAT_CFG_STATE: &str = "SUP_TASK_REPEAT_CFG_STATE";
    /// Per-project bookmarks (suffix).
    pub const BOOKMARK_STATE: &str = "BOOKMARK_STATE";
    /// Per-project notes (suffix).
    pub const NOTE_STATE: &str = "NOTE_STATE";
    /// Per-project metrics (suffix).
    pub const METRIC_STATE: &str = "METRIC_STATE";
    /// Per-project improvements (suffix).
    pub const IMPROVEMENT_STATE: &str = "IMPROVEMENT_STATE";
    /// Per-project obstructions (suffix).
    pub const OBSTRUCTION_STATE: &str = "OBSTRUCTION_STATE";
}

/// Returns the storage key for a logical key, scoped to a project if given.
///
/// # Example
///
/// ```
/// use planstore_core::storage_key;
///
/// assert_eq!(storage_key("task", None), "task");
/// assert_eq!(storage_key("note", Some("p1")), "p__p1__note");
/// ```
#[must_use]
pub fn storage_key(logical_key: &str, project_id: Option<&str>) -> String {
    match project_id {
        Some(pid) => format!("{PROJECT_KEY_PREFIX}{pid}{PROJECT_KEY_SEPARATOR}{logical_key}"),
        None => logical_key.to_string(),
    }
}

/// Splits a project-scoped storage key into `(project_id, logical_key)`.
///
/// Project ids may not contain the separator; the logical key is whatever
/// follows the first separator after the prefix.
#[must_use]
pub fn parse_project_key(key: &str) -> Option<(&str, &str)> {
    key.strip_prefix(PROJECT_KEY_PREFIX)?
        .split_once(PROJECT_KEY_SEPARATOR)
}

/// A legacy storage name for one logical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyKey {
    /// A fixed key for a global value.
    Global(String),
    /// A per-project suffix, stored as `SUP_P_<projectId>_<suffix>`.
    ProjectScoped(String),
}

impl LegacyKey {
    /// Resolves the physical legacy key.
    ///
    /// A project-scoped legacy key needs a project id; without one there is
    /// nothing to resolve.
    #[must_use]
    pub fn resolve(&self, project_id: Option<&str>) -> Option<String> {
        match (self, project_id) {
            (Self::Global(key), _) => Some(key.clone()),
            (Self::ProjectScoped(suffix), Some(pid)) => {
                Some(format!("{}{pid}_{suffix}", legacy::PROJECT_PREFIX))
            }
            (Self::ProjectScoped(_), None) => None,
        }
    }
}

/// The finite table of legacy storage names, keyed by logical key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyKeyTable {
    entries: BTreeMap<String, LegacyKey>,
}

impl LegacyKeyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding the legacy names of values that are not
    /// models (currently the project archive).
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert(
            PROJECT_ARCHIVE_KEY,
            LegacyKey::Global(legacy::PROJECT_ARCHIVE.to_string()),
        );
        table
    }

    /// Adds or replaces the legacy name of a logical key.
    pub fn insert(&mut self, logical_key: impl Into<String>, legacy_key: LegacyKey) {
        self.entries.insert(logical_key.into(), legacy_key);
    }

    /// Returns the legacy name of a logical key, if it has one.
    #[must_use]
    pub fn get(&self, logical_key: &str) -> Option<&LegacyKey> {
        self.entries.get(logical_key)
    }

    /// Resolves the physical legacy key to fall back to.
    ///
    /// Returns `None` when there is no legacy name, or when it equals the
    /// current storage key and a second read would be pointless.
    #[must_use]
    pub fn fallback_for(&self, logical_key: &str, project_id: Option<&str>) -> Option<String> {
        let resolved = self.entries.get(logical_key)?.resolve(project_id)?;
        (resolved != storage_key(logical_key, project_id)).then_some(resolved)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(logical_key, legacy_key)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LegacyKey)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_keys_are_namespaced() {
        assert_eq!(storage_key("bookmark", Some("abc")), "p__abc__bookmark");
        assert_eq!(storage_key("globalConfig", None), "globalConfig");
    }

    #[test]
    fn project_keys_parse_back() {
        assert_eq!(parse_project_key("p__p1__note"), Some(("p1", "note")));
        assert_eq!(parse_project_key("task"), None);
        assert_eq!(parse_project_key("p__broken"), None);
    }

    #[test]
    fn legacy_project_key_format() {
        let key = LegacyKey::ProjectScoped(legacy::NOTE_STATE.to_string());
        assert_eq!(key.resolve(Some("p1")).as_deref(), Some("SUP_P_p1_NOTE_STATE"));
        assert_eq!(key.resolve(None), None);
    }

    #[test]
    fn fallback_skips_identical_keys() {
        let mut table = LegacyKeyTable::new();
        table.insert("SUP_COMPLETE_BACKUP", LegacyKey::Global(BACKUP_KEY.to_string()));
        table.insert("task", LegacyKey::Global(legacy::TASK_STATE.to_string()));

        assert_eq!(table.fallback_for("SUP_COMPLETE_BACKUP", None), None);
        assert_eq!(table.fallback_for("task", None).as_deref(), Some("SUP_TASK_STATE"));
        assert_eq!(table.fallback_for("tag", None), None);
    }

    #[test]
    fn defaults_cover_the_archive() {
        let table = LegacyKeyTable::with_defaults();
        assert_eq!(
            table.fallback_for(PROJECT_ARCHIVE_KEY, None).as_deref(),
            Some("SUP_PROJECT_ARCHIVE")
        );
    }
}
