//! Backup slot commands.

use planstore_core::Persistence;
use tracing::info;

/// Stores the current snapshot in the backup slot.
pub async fn create(persistence: &Persistence) -> Result<(), Box<dyn std::error::Error>> {
    persistence.save_backup(None).await?;
    println!("✓ Backup saved");
    Ok(())
}

/// Imports the snapshot held in the backup slot.
pub async fn restore(persistence: &Persistence) -> Result<(), Box<dyn std::error::Error>> {
    let backup = persistence
        .load_backup()
        .await?
        .ok_or("No backup stored")?;
    info!(models = backup.len(), "restoring backup");
    let report = persistence.import_complete(backup).await?;
    println!("✓ Backup restored ({} values written)", report.written());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{open, Compression};
    use planstore_core::WriteMode;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn restore_without_backup_fails() {
        let dir = TempDir::new().unwrap();
        let persistence = open(dir.path(), Compression::Deflate).unwrap();
        assert!(restore(&persistence).await.is_err());
    }

    #[tokio::test]
    async fn restore_brings_back_overwritten_values() {
        let dir = TempDir::new().unwrap();
        let persistence = open(dir.path(), Compression::Deflate).unwrap();
        persistence
            .save_raw("reminders", None, json!([{"id": "r1"}]), WriteMode::Regular)
            .await
            .unwrap();
        create(&persistence).await.unwrap();

        persistence
            .save_raw("reminders", None, json!([]), WriteMode::Regular)
            .await
            .unwrap();
        restore(&persistence).await.unwrap();
        assert_eq!(
            persistence.load_raw("reminders", None).await.unwrap(),
            Some(json!([{"id": "r1"}]))
        );
    }
}
