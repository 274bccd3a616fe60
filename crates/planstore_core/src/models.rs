//! Typed model handles.
//!
//! Handles are cheap views onto a [`Persistence`] engine, bound to one
//! registered logical key:
//!
//! - [`ScalarModel`] - a single global value
//! - [`EntityModel`] - a global entity collection with a [`Reducer`]
//! - [`ProjectModel`] - one entity collection per project
//!
//! Handles convert between stored JSON and the caller's types with serde.

use crate::error::PersistenceResult;
use crate::gate::WriteMode;
use crate::persistence::Persistence;
use crate::registry::ModelKind;
use crate::state::EntityState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Whether a load applies the model's migrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Migrate the stored value to the current shape.
    #[default]
    Migrate,
    /// Return the stored value as it is.
    SkipMigration,
}

impl LoadMode {
    const fn skips(self) -> bool {
        matches!(self, Self::SkipMigration)
    }
}

/// A pure state transition: `(state, action) -> state`.
///
/// Implemented for closures `Fn(S, A) -> PersistenceResult<S>`.
pub trait Reducer<S, A>: Send + Sync {
    /// Applies `action` to `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be applied.
    fn reduce(&self, state: S, action: A) -> PersistenceResult<S>;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(S, A) -> PersistenceResult<S> + Send + Sync,
{
    fn reduce(&self, state: S, action: A) -> PersistenceResult<S> {
        self(state, action)
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> PersistenceResult<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(Into::into)
}

/// Handle to a global scalar model.
pub struct ScalarModel<T> {
    persistence: Persistence,
    logical_key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ScalarModel<T> {
    fn clone(&self) -> Self {
        Self {
            persistence: self.persistence.clone(),
            logical_key: self.logical_key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ScalarModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarModel")
            .field("logical_key", &self.logical_key)
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> ScalarModel<T> {
    /// Returns the logical key.
    #[must_use]
    pub fn logical_key(&self) -> &str {
        &self.logical_key
    }

    /// Loads and migrates the stored value. `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Propagates store, migration and deserialization failures.
    pub async fn load(&self) -> PersistenceResult<Option<T>> {
        self.load_with(LoadMode::Migrate).await
    }

    /// Loads the stored value, optionally skipping migration.
    ///
    /// # Errors
    ///
    /// Propagates store, migration and deserialization failures.
    pub async fn load_with(&self, mode: LoadMode) -> PersistenceResult<Option<T>> {
        let value = self
            .persistence
            .load_model(&self.logical_key, None, mode.skips())
            .await?;
        decode(value)
    }

    /// Saves a value.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress (unless `mode` is
    /// [`WriteMode::Import`]) and on store failures.
    pub async fn save(&self, value: &T, mode: WriteMode) -> PersistenceResult<()> {
        let value = serde_json::to_value(value)?;
        self.persistence
            .save_raw(&self.logical_key, None, value, mode)
            .await?;
        Ok(())
    }
}

/// Handle to a global entity collection.
pub struct EntityModel<E, A> {
    persistence: Persistence,
    logical_key: String,
    reducer: Arc<dyn Reducer<EntityState<E>, A>>,
}

impl<E, A> Clone for EntityModel<E, A> {
    fn clone(&self) -> Self {
        Self {
            persistence: self.persistence.clone(),
            logical_key: self.logical_key.clone(),
            reducer: Arc::clone(&self.reducer),
        }
    }
}

impl<E, A> std::fmt::Debug for EntityModel<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityModel")
            .field("logical_key", &self.logical_key)
            .finish_non_exhaustive()
    }
}

impl<E, A> EntityModel<E, A>
where
    E: Serialize + DeserializeOwned,
{
    /// Returns the logical key.
    #[must_use]
    pub fn logical_key(&self) -> &str {
        &self.logical_key
    }

    /// Loads and migrates the collection. `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Propagates store, migration and deserialization failures.
    pub async fn load(&self) -> PersistenceResult<Option<EntityState<E>>> {
        self.load_with(LoadMode::Migrate).await
    }

    /// Loads the collection, optionally skipping migration.
    ///
    /// # Errors
    ///
    /// Propagates store, migration and deserialization failures.
    pub async fn load_with(&self, mode: LoadMode) -> PersistenceResult<Option<EntityState<E>>> {
        let value = self
            .persistence
            .load_model(&self.logical_key, None, mode.skips())
            .await?;
        decode(value)
    }

    /// Saves the collection, repairing id/entity mismatches first.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress (unless `mode` is
    /// [`WriteMode::Import`]) and on store failures.
    pub async fn save(&self, state: &EntityState<E>, mode: WriteMode) -> PersistenceResult<()> {
        let value = serde_json::to_value(state)?;
        self.persistence
            .save_raw(&self.logical_key, None, value, mode)
            .await?;
        Ok(())
    }

    /// Returns one entity. `None` if the collection or the entity is absent.
    ///
    /// # Errors
    ///
    /// Propagates load failures; a missing entity is not an error.
    pub async fn get_by_id(&self, id: &str) -> PersistenceResult<Option<E>> {
        Ok(self.load().await?.and_then(|mut s| s.entities.remove(id)))
    }

    /// Loads the collection, applies `action` through the reducer, saves the
    /// result and returns it.
    ///
    /// Calls on the same logical key run one at a time, so no update is
    /// lost to an interleaved read-modify-write.
    ///
    /// # Errors
    ///
    /// Propagates reducer, load and save failures. Nothing is written when
    /// the reducer fails.
    pub async fn exec_action(&self, action: A) -> PersistenceResult<EntityState<E>> {
        let lock = self.persistence.action_lock(&self.logical_key);
        let _held = lock.lock().await;

        let prior = self.load().await?.unwrap_or_default();
        let next = self.reducer.reduce(prior, action)?.repaired();
        self.save(&next, WriteMode::Regular).await?;
        debug!(logical_key = %self.logical_key, "action applied");
        Ok(next)
    }
}

/// Handle to a project-scoped entity collection.
pub struct ProjectModel<E> {
    persistence: Persistence,
    logical_key: String,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for ProjectModel<E> {
    fn clone(&self) -> Self {
        Self {
            persistence: self.persistence.clone(),
            logical_key: self.logical_key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for ProjectModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectModel")
            .field("logical_key", &self.logical_key)
            .finish()
    }
}

impl<E> ProjectModel<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Returns the logical key.
    #[must_use]
    pub fn logical_key(&self) -> &str {
        &self.logical_key
    }

    /// Loads and migrates one project's collection.
    ///
    /// # Errors
    ///
    /// Propagates store, migration and deserialization failures.
    pub async fn load(&self, project_id: &str) -> PersistenceResult<Option<EntityState<E>>> {
        self.load_with(project_id, LoadMode::Migrate).await
    }

    /// Loads one project's collection, optionally skipping migration.
    ///
    /// # Errors
    ///
    /// Propagates store, migration and deserialization failures.
    pub async fn load_with(
        &self,
        project_id: &str,
        mode: LoadMode,
    ) -> PersistenceResult<Option<EntityState<E>>> {
        let value = self
            .persistence
            .load_model(&self.logical_key, Some(project_id), mode.skips())
            .await?;
        decode(value)
    }

    /// Saves one project's collection.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress (unless `mode` is
    /// [`WriteMode::Import`]) and on store failures.
    pub async fn save(
        &self,
        project_id: &str,
        state: &EntityState<E>,
        mode: WriteMode,
    ) -> PersistenceResult<()> {
        let value = serde_json::to_value(state)?;
        self.persistence
            .save_raw(&self.logical_key, Some(project_id), value, mode)
            .await?;
        Ok(())
    }

    /// Removes one project's collection.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress and on store failures.
    pub async fn remove(&self, project_id: &str) -> PersistenceResult<()> {
        self.persistence
            .remove_raw(&self.logical_key, Some(project_id), WriteMode::Regular)
            .await
    }

    /// Returns one entity of one project.
    ///
    /// # Errors
    ///
    /// Propagates load failures; a missing entity is not an error.
    pub async fn get_by_id(&self, project_id: &str, id: &str) -> PersistenceResult<Option<E>> {
        Ok(self
            .load(project_id)
            .await?
            .and_then(|mut s| s.entities.remove(id)))
    }
}

impl Persistence {
    /// Returns a handle to a registered scalar model.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or not a scalar model.
    pub fn scalar<T>(&self, logical_key: &str) -> PersistenceResult<ScalarModel<T>> {
        self.expect_model(logical_key, ModelKind::Scalar)?;
        Ok(ScalarModel {
            persistence: self.clone(),
            logical_key: logical_key.to_string(),
            _marker: PhantomData,
        })
    }

    /// Returns a handle to a registered entity model, bound to a reducer.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or not an entity model.
    pub fn entity<E, A>(
        &self,
        logical_key: &str,
        reducer: impl Reducer<EntityState<E>, A> + 'static,
    ) -> PersistenceResult<EntityModel<E, A>> {
        self.expect_model(logical_key, ModelKind::Entity)?;
        Ok(EntityModel {
            persistence: self.clone(),
            logical_key: logical_key.to_string(),
            reducer: Arc::new(reducer),
        })
    }

    /// Returns a handle to a registered project-scoped model.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or not project-scoped.
    pub fn project<E>(&self, logical_key: &str) -> PersistenceResult<ProjectModel<E>> {
        self.expect_model(logical_key, ModelKind::ProjectScoped)?;
        Ok(ProjectModel {
            persistence: self.clone(),
            logical_key: logical_key.to_string(),
            _marker: PhantomData,
        })
    }
}
