//! Inspect command implementation.

use planstore_core::{ModelKind, Persistence};
use planstore_storage::KeyValueStore;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Number of stored keys.
    pub key_count: usize,
    /// Projects listed in the project index.
    pub project_ids: Vec<String>,
    /// Archived project ids.
    pub archived_projects: Vec<String>,
    /// Whether the backup slot is filled.
    pub has_backup: bool,
    /// Last local model change, milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_local_sync_model_change: Option<i64>,
    /// Per-model statistics.
    pub models: Vec<ModelStats>,
}

/// Statistics for a single model.
#[derive(Debug, Serialize)]
pub struct ModelStats {
    /// Logical key.
    pub key: String,
    /// Model kind.
    pub kind: String,
    /// Number of entities, summed over projects for project-scoped models.
    /// `None` for scalars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<usize>,
}

/// Collects the inspection result.
pub async fn collect(
    persistence: &Persistence,
    path: &Path,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let keys = persistence.store().keys().await?;
    let snapshot = persistence.load_complete().await?;
    let archive = persistence.load_project_archive().await?;
    let has_backup = persistence.load_backup().await?.is_some();

    let models = persistence
        .registry()
        .iter()
        .map(|spec| {
            let value = snapshot.get(spec.logical_key());
            let entities = match spec.kind() {
                ModelKind::Scalar => None,
                ModelKind::Entity => Some(value.map_or(0, entity_count)),
                ModelKind::ProjectScoped => Some(
                    value
                        .and_then(Value::as_object)
                        .map_or(0, |projects| projects.values().map(entity_count).sum()),
                ),
            };
            ModelStats {
                key: spec.logical_key().to_string(),
                kind: format!("{:?}", spec.kind()),
                entities,
            }
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        key_count: keys.len(),
        project_ids: persistence.load_project_ids().await?,
        archived_projects: archive.into_keys().collect(),
        has_backup,
        last_local_sync_model_change: snapshot.last_local_sync_model_change,
        models,
    })
}

/// Runs the inspect command.
pub async fn run(
    persistence: &Persistence,
    path: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(persistence, path).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text(&result),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("planstore data directory: {}", result.path);
    println!("  Keys: {}", result.key_count);
    println!("  Projects: {}", result.project_ids.join(", "));
    if !result.archived_projects.is_empty() {
        println!("  Archived: {}", result.archived_projects.join(", "));
    }
    println!("  Backup: {}", if result.has_backup { "yes" } else { "no" });
    if let Some(ts) = result.last_local_sync_model_change {
        println!("  Last local change: {ts}");
    }
    println!();
    println!("Models:");
    for model in &result.models {
        match model.entities {
            Some(n) => println!("  {:<16} {:<14} {n} entities", model.key, model.kind),
            None => println!("  {:<16} {}", model.key, model.kind),
        }
    }
}

fn entity_count(collection: &Value) -> usize {
    collection
        .get("ids")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{open, Compression};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn counts_entities_per_model() {
        let dir = TempDir::new().unwrap();
        let persistence = open(dir.path(), Compression::Deflate).unwrap();
        persistence
            .save_raw(
                "project",
                None,
                json!({"ids": ["p1"], "entities": {"p1": {"id": "p1"}}}),
                planstore_core::WriteMode::Regular,
            )
            .await
            .unwrap();
        persistence
            .save_raw(
                "note",
                Some("p1"),
                json!({"ids": ["n1", "n2"], "entities": {"n1": {}, "n2": {}}}),
                planstore_core::WriteMode::Regular,
            )
            .await
            .unwrap();

        let result = collect(&persistence, dir.path()).await.unwrap();
        assert_eq!(result.project_ids, vec!["p1"]);
        assert!(!result.has_backup);

        let note = result.models.iter().find(|m| m.key == "note").unwrap();
        assert_eq!(note.entities, Some(2));
        let config = result.models.iter().find(|m| m.key == "globalConfig").unwrap();
        assert_eq!(config.entities, None);
    }
}
