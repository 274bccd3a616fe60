//! Persistence engine configuration.

use crate::keys::logical;

/// Configuration for a [`crate::Persistence`] engine.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Project id used when no project collection has ever been stored.
    pub default_project_id: String,

    /// Logical key of the base entity model that lists the known projects.
    pub project_index_key: String,

    /// Number of change events the feed retains for polling.
    pub event_history: usize,

    /// Whether regular (non-import) model writes bump the last-sync-change
    /// timestamp.
    pub track_local_changes: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            default_project_id: "DEFAULT".to_string(),
            project_index_key: logical::PROJECT.to_string(),
            event_history: 1000,
            track_local_changes: true,
        }
    }
}

impl PersistenceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback project id.
    #[must_use]
    pub fn default_project_id(mut self, id: impl Into<String>) -> Self {
        self.default_project_id = id.into();
        self
    }

    /// Sets the logical key of the project index model.
    #[must_use]
    pub fn project_index_key(mut self, key: impl Into<String>) -> Self {
        self.project_index_key = key.into();
        self
    }

    /// Sets how many change events are retained.
    #[must_use]
    pub const fn event_history(mut self, len: usize) -> Self {
        self.event_history = len;
        self
    }

    /// Sets whether regular writes bump the last-sync-change timestamp.
    #[must_use]
    pub const fn track_local_changes(mut self, value: bool) -> Self {
        self.track_local_changes = value;
        self
    }
}
