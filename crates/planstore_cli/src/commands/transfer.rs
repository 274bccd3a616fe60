//! Snapshot export and import.

use planstore_core::{AppDataComplete, Persistence};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes the complete snapshot as JSON to `output`, or stdout.
pub async fn export(
    persistence: &Persistence,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = persistence.load_complete().await?;
    write_output(&snapshot.to_json_pretty()?, output)?;
    if let Some(path) = output {
        println!("✓ Exported {} models to {:?}", snapshot.len(), path);
    }
    Ok(())
}

/// Replaces all data with the snapshot in `input`.
pub async fn import(
    persistence: &Persistence,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing snapshot from {:?}", input);
    let text = fs::read_to_string(input)?;
    let snapshot = AppDataComplete::from_json(&text)?;
    let report = persistence.import_complete(snapshot).await?;

    println!("✓ Import complete");
    println!("  Base models: {}", report.base_written);
    println!("  Project values: {}", report.project_written);
    if !report.missing_keys.is_empty() {
        println!("  Missing: {}", report.missing_keys.join(", "));
    }
    Ok(())
}

/// Writes one project and its related data as JSON.
pub async fn export_project(
    persistence: &Persistence,
    project_id: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = persistence
        .load_complete_project(project_id)
        .await?
        .ok_or_else(|| format!("No project with id {project_id:?}"))?;
    write_output(&serde_json::to_string_pretty(&project)?, output)
}

fn write_output(text: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            let mut file = fs::File::create(path)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        None => println!("{text}"),
    }
    Ok(())
}
