//! Complete snapshot assembly and import.

use crate::change_feed::Change;
use crate::error::{PersistenceError, PersistenceResult};
use crate::gate::WriteMode;
use crate::persistence::{now_millis, Persistence};
use crate::snapshot::{AppData, AppDataComplete, ImportReport};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One value loaded during assembly: `(logical_key, project_id, value)`.
type Loaded = (String, Option<String>, Option<Value>);

/// Which kind of value an import task wrote.
enum Written {
    Base,
    Project,
}

fn project_ids_of(collection: &Value) -> PersistenceResult<Vec<String>> {
    let ids = collection
        .get("ids")
        .and_then(Value::as_array)
        .ok_or_else(|| PersistenceError::broken_index("project collection has no id list"))?;

    let ids: Vec<String> = ids
        .iter()
        .filter_map(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    if ids.is_empty() {
        return Err(PersistenceError::broken_index("project collection lists no ids"));
    }
    Ok(ids)
}

impl Persistence {
    /// Returns the ids of all known projects.
    ///
    /// A store that never held a project collection yields the configured
    /// default project id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::BrokenIndex`] if the collection cannot be
    /// loaded or lists no ids.
    pub async fn load_project_ids(&self) -> PersistenceResult<Vec<String>> {
        let index_key = &self.inner.config.project_index_key;
        let collection = self
            .load_model(index_key, None, false)
            .await
            .map_err(|e| PersistenceError::broken_index(format!("cannot load {index_key:?}: {e}")))?;

        match collection {
            None => Ok(vec![self.inner.config.default_project_id.clone()]),
            Some(collection) => project_ids_of(&collection),
        }
    }

    /// Returns the complete application snapshot.
    ///
    /// The first call assembles it from storage; later calls return the
    /// cached body (patched by every write) until the cache is invalidated.
    /// The timestamp is always read live.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::BrokenIndex`] if the project index is
    /// broken; propagates store and migration failures.
    pub async fn load_complete(&self) -> PersistenceResult<AppDataComplete> {
        let data = match self.inner.cache.get() {
            Some(cached) => cached,
            None => {
                let generation = self.inner.cache.generation();
                let assembled = self.assemble().await?;
                self.inner.cache.store_if_current(generation, assembled)
            }
        };
        Ok(AppDataComplete {
            data,
            last_local_sync_model_change: self.last_local_sync_model_change().await?,
        })
    }

    /// Assembles a snapshot body from storage, bypassing the cache.
    ///
    /// Project-scoped values that are absent are left out of their
    /// per-project map; absent global values are replaced by the model's
    /// default.
    ///
    /// # Errors
    ///
    /// See [`Persistence::load_complete`].
    pub async fn assemble(&self) -> PersistenceResult<AppData> {
        let project_ids = self.load_project_ids().await?;
        debug!(projects = project_ids.len(), "assembling complete snapshot");

        let mut tasks: JoinSet<PersistenceResult<Loaded>> = JoinSet::new();
        for spec in self.inner.registry.project_models() {
            for pid in &project_ids {
                let this = self.clone();
                let key = spec.logical_key().to_string();
                let pid = pid.clone();
                tasks.spawn(async move {
                    let value = this.load_model(&key, Some(&pid), false).await?;
                    Ok((key, Some(pid), value))
                });
            }
        }
        for spec in self.inner.registry.base_models() {
            let this = self.clone();
            let key = spec.logical_key().to_string();
            tasks.spawn(async move {
                let value = this.load_model(&key, None, false).await?;
                Ok((key, None, value))
            });
        }

        let mut data: BTreeMap<String, Value> = self
            .inner
            .registry
            .project_models()
            .map(|spec| (spec.logical_key().to_string(), Value::Object(Map::new())))
            .collect();

        while let Some(joined) = tasks.join_next().await {
            let (key, pid, value) = joined??;
            match pid {
                Some(pid) => {
                    if let (Some(value), Some(Value::Object(projects))) = (value, data.get_mut(&key)) {
                        projects.insert(pid, value);
                    }
                }
                None => {
                    let value = match value {
                        Some(value) => value,
                        None => self
                            .inner
                            .registry
                            .get(&key)
                            .map(|spec| spec.default_value().clone())
                            .unwrap_or(Value::Null),
                    };
                    data.insert(key, value);
                }
            }
        }
        Ok(AppData::from(data))
    }

    /// Replaces all stored model data with a snapshot.
    ///
    /// Regular writes are rejected until the import settles. Every global
    /// model is written (its default if the snapshot lacks it) and every
    /// non-null project entry of every project-scoped model. A
    /// project-scoped key missing from the snapshot is logged and skipped.
    /// On success the timestamp is set from the snapshot (or to now), the
    /// cache is replaced with the snapshot as given, and an import event is
    /// published.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::ImportInProgress`] if another import is
    /// running; otherwise the first write failure, after all writes have
    /// settled. The save gate is released in every case.
    pub async fn import_complete(&self, snapshot: AppDataComplete) -> PersistenceResult<ImportReport> {
        let _gate = self.inner.gate.engage()?;
        info!("importing complete snapshot");

        let mut report = ImportReport::default();
        let mut tasks: JoinSet<PersistenceResult<Written>> = JoinSet::new();

        for spec in self.inner.registry.base_models() {
            let this = self.clone();
            let key = spec.logical_key().to_string();
            let value = snapshot
                .get(&key)
                .cloned()
                .unwrap_or_else(|| spec.default_value().clone());
            tasks.spawn(async move {
                this.save_raw(&key, None, value, WriteMode::Import).await?;
                Ok(Written::Base)
            });
        }

        for spec in self.inner.registry.project_models() {
            let key = spec.logical_key();
            let Some(Value::Object(projects)) = snapshot.get(key) else {
                warn!(logical_key = key, "related model data missing from snapshot, skipping");
                report.missing_keys.push(key.to_string());
                continue;
            };
            for (pid, value) in projects {
                if value.is_null() {
                    report.skipped_null += 1;
                    continue;
                }
                let this = self.clone();
                let key = key.to_string();
                let pid = pid.clone();
                let value = value.clone();
                tasks.spawn(async move {
                    this.save_raw(&key, Some(&pid), value, WriteMode::Import)
                        .await?;
                    Ok(Written::Project)
                });
            }
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(PersistenceError::from).and_then(|r| r) {
                Ok(Written::Base) => report.base_written += 1,
                Ok(Written::Project) => report.project_written += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            warn!(error = %e, "import failed");
            return Err(e);
        }

        let timestamp = snapshot.last_local_sync_model_change.unwrap_or_else(now_millis);
        self.set_last_local_sync_model_change(timestamp).await?;
        self.inner.cache.replace(Arc::clone(&snapshot.data));
        self.inner.feed.publish(Change::Imported(Arc::clone(&snapshot.data)));

        info!(
            written = report.written(),
            missing = report.missing_keys.len(),
            "import complete"
        );
        Ok(report)
    }
}
