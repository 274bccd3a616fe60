//! Project archive commands.

use planstore_core::Persistence;

/// Moves a project's related data into the archive.
pub async fn archive(
    persistence: &Persistence,
    project_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    persistence.archive_project(project_id).await?;
    println!("✓ Project {project_id} archived");
    Ok(())
}

/// Restores a project's related data from the archive.
pub async fn unarchive(
    persistence: &Persistence,
    project_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !persistence.load_project_archive().await?.contains_key(project_id) {
        return Err(format!("Project {project_id:?} is not archived").into());
    }
    persistence.unarchive_project(project_id).await?;
    println!("✓ Project {project_id} restored");
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
    async fn archive_and_unarchive_without_compression() {
        let dir = TempDir::new().unwrap();
        let persistence = open(dir.path(), Compression::None).unwrap();
        let notes = json!({"ids": ["n1"], "entities": {"n1": {"id": "n1"}}});
        persistence
            .save_raw("note", Some("p1"), notes.clone(), WriteMode::Regular)
            .await
            .unwrap();

        archive(&persistence, "p1").await.unwrap();
        assert_eq!(persistence.load_raw("note", Some("p1")).await.unwrap(), None);

        unarchive(&persistence, "p1").await.unwrap();
        assert_eq!(
            persistence.load_raw("note", Some("p1")).await.unwrap(),
            Some(notes)
        );
        assert!(unarchive(&persistence, "p1").await.is_err());
    }
}
