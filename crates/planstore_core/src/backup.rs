//! Backups and store compaction.
//!
//! A backup is one complete snapshot stored under [`BACKUP_KEY`]. It is
//! written with import semantics so it can be taken while an import holds
//! the save gate.

use crate::error::PersistenceResult;
use crate::gate::WriteMode;
use crate::keys::BACKUP_KEY;
use crate::persistence::Persistence;
use crate::snapshot::{AppDataComplete, ImportReport};
use tracing::info;

impl Persistence {
    /// Stores a backup of `snapshot`, or of the current state if `None`.
    ///
    /// # Errors
    ///
    /// Propagates snapshot assembly, serialization and store failures.
    pub async fn save_backup(&self, snapshot: Option<AppDataComplete>) -> PersistenceResult<()> {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => self.load_complete().await?,
        };
        let value = serde_json::to_value(&snapshot)?;
        self.save_raw(BACKUP_KEY, None, value, WriteMode::Import)
            .await?;
        info!(models = snapshot.len(), "backup saved");
        Ok(())
    }

    /// Loads the stored backup, if any.
    ///
    /// # Errors
    ///
    /// Propagates store and deserialization failures.
    pub async fn load_backup(&self) -> PersistenceResult<Option<AppDataComplete>> {
        match self.load_raw(BACKUP_KEY, None).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Wipes the store but keeps the backup, if one exists.
    ///
    /// # Errors
    ///
    /// Fails while an import is in progress and on store failures.
    pub async fn clear_database_except_backup(&self) -> PersistenceResult<()> {
        let backup = self.load_backup().await?;
        self.clear_database(WriteMode::Regular).await?;
        if let Some(backup) = backup {
            self.save_backup(Some(backup)).await?;
        }
        Ok(())
    }

    /// Compacts the store: snapshots all model data, wipes everything and
    /// re-imports the snapshot.
    ///
    /// Anything that is not part of the snapshot (legacy keys, the archive,
    /// the backup, data of unknown projects) is dropped.
    ///
    /// # Errors
    ///
    /// Propagates snapshot, wipe and import failures.
    pub async fn clean_database(&self) -> PersistenceResult<ImportReport> {
        let snapshot = self.load_complete().await?;
        self.clear_database(WriteMode::Regular).await?;
        let report = self.import_complete(snapshot).await?;
        info!(written = report.written(), "database compacted");
        Ok(report)
    }
}
