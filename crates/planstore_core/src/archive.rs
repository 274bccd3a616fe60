//! Project archives.
//!
//! Archiving moves all project-scoped data of one project out of live
//! storage into a single compressed token, kept in the project archive
//! (`projectId -> token`). The archive is written before live data is
//! deleted, and live data is restored before the archive entry is
//! removed, so a crash in between leaves a duplicate rather than a loss.

use crate::error::PersistenceResult;
use crate::gate::WriteMode;
use crate::keys::PROJECT_ARCHIVE_KEY;
use crate::persistence::Persistence;
use crate::snapshot::{ExportedProject, RelatedModels};
use planstore_codec::{compress_tagged, decompress_tagged};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The project archive: project id to compressed related-model data.
pub type ProjectArchive = BTreeMap<String, String>;

impl Persistence {
    /// Loads the project archive. Empty if nothing is stored.
    ///
    /// # Errors
    ///
    /// Propagates store and deserialization failures.
    pub async fn load_project_archive(&self) -> PersistenceResult<ProjectArchive> {
        match self.load_raw(PROJECT_ARCHIVE_KEY, None).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(ProjectArchive::new()),
        }
    }

    /// Saves the project archive.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress (unless `mode` is
    /// [`WriteMode::Import`]) and on store failures.
    pub async fn save_project_archive(
        &self,
        archive: &ProjectArchive,
        mode: WriteMode,
    ) -> PersistenceResult<()> {
        let value = serde_json::to_value(archive)?;
        self.save_raw(PROJECT_ARCHIVE_KEY, None, value, mode).await?;
        Ok(())
    }

    /// Loads every project-scoped value of one project, keyed by logical
    /// key. Absent values are left out.
    ///
    /// # Errors
    ///
    /// Propagates store and migration failures.
    pub async fn load_all_related_model_data_for_project(
        &self,
        project_id: &str,
    ) -> PersistenceResult<RelatedModels> {
        let mut related = RelatedModels::new();
        for spec in self.inner.registry.project_models() {
            let key = spec.logical_key();
            if let Some(value) = self.load_model(key, Some(project_id), false).await? {
                related.insert(key.to_string(), value);
            }
        }
        Ok(related)
    }

    /// Removes every project-scoped value of one project.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress and on store failures.
    pub async fn remove_complete_related_data_for_project(
        &self,
        project_id: &str,
    ) -> PersistenceResult<()> {
        let keys: Vec<String> = self
            .inner
            .registry
            .project_models()
            .map(|spec| spec.logical_key().to_string())
            .collect();
        for key in keys {
            self.remove_raw(&key, Some(project_id), WriteMode::Regular)
                .await?;
        }
        Ok(())
    }

    /// Writes related-model data back into live storage.
    ///
    /// Keys that are not project-scoped models are logged and ignored.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress and on store failures.
    pub async fn restore_complete_related_data_for_project(
        &self,
        project_id: &str,
        related: RelatedModels,
    ) -> PersistenceResult<()> {
        for (key, value) in related {
            let scoped = self
                .inner
                .registry
                .get(&key)
                .is_some_and(|spec| !spec.kind().is_base());
            if !scoped {
                warn!(logical_key = %key, project_id, "ignoring unknown related model");
                continue;
            }
            if value.is_null() {
                continue;
            }
            self.save_raw(&key, Some(project_id), value, WriteMode::Regular)
                .await?;
        }
        Ok(())
    }

    /// Compresses related-model data and stores it in the archive under the
    /// project id, replacing any previous entry. The token is tagged with
    /// the codec that wrote it.
    ///
    /// # Errors
    ///
    /// Propagates codec, store and serialization failures.
    pub async fn save_archived_project(
        &self,
        project_id: &str,
        related: &RelatedModels,
    ) -> PersistenceResult<()> {
        let serialized = serde_json::to_string(related)?;
        let token = compress_tagged(self.compressor().as_ref(), &serialized).await?;
        debug!(
            project_id,
            before = serialized.len(),
            after = token.len(),
            "compressed project data"
        );

        let mut archive = self.load_project_archive().await?;
        archive.insert(project_id.to_string(), token);
        self.save_project_archive(&archive, WriteMode::Regular).await
    }

    /// Decompresses the archived related-model data of a project.
    ///
    /// # Errors
    ///
    /// A missing entry is read as an empty token, which fails to decode.
    /// Tokens tagged with an unknown codec are rejected. Codec and parse
    /// failures propagate.
    pub async fn load_archived_project(&self, project_id: &str) -> PersistenceResult<RelatedModels> {
        let archive = self.load_project_archive().await?;
        let token = archive.get(project_id).map(String::as_str).unwrap_or("");
        let serialized = decompress_tagged(self.compressor(), token).await?;
        debug!(
            project_id,
            before = token.len(),
            after = serialized.len(),
            "decompressed project data"
        );
        Ok(serde_json::from_str(&serialized)?)
    }

    /// Deletes a project's archive entry and persists the archive.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress and on store failures.
    pub async fn remove_archived_project(&self, project_id: &str) -> PersistenceResult<()> {
        let mut archive = self.load_project_archive().await?;
        archive.remove(project_id);
        self.save_project_archive(&archive, WriteMode::Regular).await
    }

    /// Moves a project's related-model data into the archive.
    ///
    /// # Errors
    ///
    /// Propagates load, codec and write failures. Live data is only
    /// deleted after the archive was written.
    pub async fn archive_project(&self, project_id: &str) -> PersistenceResult<()> {
        let related = self.load_all_related_model_data_for_project(project_id).await?;
        self.save_archived_project(project_id, &related).await?;
        self.remove_complete_related_data_for_project(project_id)
            .await?;
        info!(project_id, models = related.len(), "project archived");
        Ok(())
    }

    /// Restores a project's related-model data from the archive.
    ///
    /// # Errors
    ///
    /// Propagates codec, parse and write failures. The archive entry is
    /// only removed after the data was restored.
    pub async fn unarchive_project(&self, project_id: &str) -> PersistenceResult<()> {
        let related = self.load_archived_project(project_id).await?;
        let models = related.len();
        self.restore_complete_related_data_for_project(project_id, related)
            .await?;
        self.remove_archived_project(project_id).await?;
        info!(project_id, models, "project unarchived");
        Ok(())
    }

    /// Returns a project entity together with its related-model data.
    ///
    /// `None` if the project collection has no entity with that id.
    ///
    /// # Errors
    ///
    /// Propagates store and migration failures.
    pub async fn load_complete_project(
        &self,
        project_id: &str,
    ) -> PersistenceResult<Option<ExportedProject>> {
        let index_key = self.inner.config.project_index_key.clone();
        let project = self
            .load_model(&index_key, None, false)
            .await?
            .and_then(|mut collection| collection.get_mut("entities")?.get_mut(project_id).map(Value::take));
        let Some(Value::Object(project)) = project else {
            return Ok(None);
        };

        let related_models = self.load_all_related_model_data_for_project(project_id).await?;
        Ok(Some(ExportedProject {
            project,
            related_models,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::keys::logical;
    use crate::config::PersistenceConfig;
    use crate::registry::ModelRegistry;
    use planstore_codec::{Compressor, DeflateCompressor, PassthroughCompressor};
    use planstore_storage::{InMemoryStore, KeyValueStore};
    use serde_json::json;
    use std::sync::Arc;

    fn over(store: &Arc<InMemoryStore>, codec: Arc<dyn Compressor>) -> Persistence {
        Persistence::new(
            Arc::clone(store) as Arc<dyn KeyValueStore>,
            codec,
            ModelRegistry::task_app(),
            PersistenceConfig::default(),
        )
        .unwrap()
    }

    fn notes() -> Value {
        json!({"ids": ["n1"], "entities": {"n1": {"text": "remember"}}})
    }

    #[tokio::test]
    async fn archive_then_unarchive_restores_everything() {
        let persistence = Persistence::in_memory().unwrap();
        persistence
            .save_raw(logical::NOTE, Some("p1"), notes(), WriteMode::Regular)
            .await
            .unwrap();
        persistence
            .save_raw(logical::METRIC, Some("p1"), json!({"ids": [], "entities": {}}), WriteMode::Regular)
            .await
            .unwrap();
        let before = persistence.load_all_related_model_data_for_project("p1").await.unwrap();

        persistence.archive_project("p1").await.unwrap();
        assert!(persistence.load_raw(logical::NOTE, Some("p1")).await.unwrap().is_none());
        assert!(persistence.load_project_archive().await.unwrap().contains_key("p1"));

        persistence.unarchive_project("p1").await.unwrap();
        assert_eq!(
            persistence.load_all_related_model_data_for_project("p1").await.unwrap(),
            before
        );
        assert!(persistence.load_project_archive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unarchiving_unknown_project_fails() {
        let persistence = Persistence::in_memory().unwrap();
        let err = persistence.unarchive_project("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Serialization(_) | PersistenceError::Codec(_)
        ));
    }

    #[tokio::test]
    async fn corrupted_token_fails() {
        let persistence = Persistence::in_memory().unwrap();
        let archive: ProjectArchive = [("p1".to_string(), "%%%".to_string())].into_iter().collect();
        persistence
            .save_project_archive(&archive, WriteMode::Regular)
            .await
            .unwrap();

        assert!(matches!(
            persistence.load_archived_project("p1").await,
            Err(PersistenceError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn archive_is_read_from_legacy_key() {
        let persistence = Persistence::in_memory().unwrap();
        persistence
            .store()
            .save("SUP_PROJECT_ARCHIVE", &json!({"old": "token"}))
            .await
            .unwrap();
        let archive = persistence.load_project_archive().await.unwrap();
        assert_eq!(archive.get("old").map(String::as_str), Some("token"));
    }

    #[tokio::test]
    async fn remove_archived_project_persists() {
        let persistence = Persistence::in_memory().unwrap();
        persistence
            .save_archived_project("p1", &RelatedModels::new())
            .await
            .unwrap();
        persistence
            .save_archived_project("p2", &RelatedModels::new())
            .await
            .unwrap();

        persistence.remove_archived_project("p1").await.unwrap();
        let archive = persistence.load_project_archive().await.unwrap();
        assert_eq!(archive.keys().collect::<Vec<_>>(), vec!["p2"]);
    }

    #[tokio::test]
    async fn complete_project_bundles_related_data() {
        let persistence = Persistence::in_memory().unwrap();
        persistence
            .save_raw(
                logical::PROJECT,
                None,
                json!({"ids": ["p1"], "entities": {"p1": {"id": "p1", "title": "Home"}}}),
                WriteMode::Regular,
            )
            .await
            .unwrap();
        persistence
            .save_raw(logical::NOTE, Some("p1"), notes(), WriteMode::Regular)
            .await
            .unwrap();

        let exported = persistence.load_complete_project("p1").await.unwrap().unwrap();
        assert_eq!(exported.project["title"], "Home");
        assert_eq!(exported.related_models.get("note"), Some(&notes()));
        assert!(persistence.load_complete_project("p9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn archive_survives_codec_change() {
        let store = Arc::new(InMemoryStore::new());
        let deflate = over(&store, Arc::new(DeflateCompressor::default()));
        let none = over(&store, Arc::new(PassthroughCompressor));

        deflate
            .save_raw(logical::NOTE, Some("p1"), notes(), WriteMode::Regular)
            .await
            .unwrap();
        deflate.archive_project("p1").await.unwrap();
        none.unarchive_project("p1").await.unwrap();
        assert_eq!(none.load_raw(logical::NOTE, Some("p1")).await.unwrap(), Some(notes()));

        none.archive_project("p1").await.unwrap();
        deflate.unarchive_project("p1").await.unwrap();
        assert_eq!(deflate.load_raw(logical::NOTE, Some("p1")).await.unwrap(), Some(notes()));
        assert!(deflate.load_project_archive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn untagged_archive_token_is_read_with_configured_codec() {
        let persistence = Persistence::in_memory().unwrap();
        let related: RelatedModels = [("note".to_string(), notes())].into_iter().collect();
        let untagged = DeflateCompressor::default()
            .compress(&serde_json::to_string(&related).unwrap())
            .await
            .unwrap();
        let archive: ProjectArchive = [("p1".to_string(), untagged)].into_iter().collect();
        persistence
            .save_project_archive(&archive, WriteMode::Regular)
            .await
            .unwrap();

        assert_eq!(persistence.load_archived_project("p1").await.unwrap(), related);
    }

    #[tokio::test]
    async fn archive_token_with_unknown_codec_fails() {
        let persistence = Persistence::in_memory().unwrap();
        let archive: ProjectArchive = [("p1".to_string(), "zstd:KLUv".to_string())].into_iter().collect();
        persistence
            .save_project_archive(&archive, WriteMode::Regular)
            .await
            .unwrap();

        assert!(matches!(
            persistence.load_archived_project("p1").await,
            Err(PersistenceError::Codec(planstore_codec::CodecError::UnknownCodec(_)))
        ));
    }

    #[tokio::test]
    async fn archiving_is_blocked_during_import() {
        let persistence = Persistence::in_memory().unwrap();
        let _gate = persistence.inner.gate.engage().unwrap();
        assert!(persistence
            .archive_project("p1")
            .await
            .unwrap_err()
            .is_retryable());
    }
}
