//! Compaction and wipe commands.

use planstore_core::{Persistence, WriteMode};
use planstore_storage::KeyValueStore;
use tracing::info;

/// Rewrites all data under current keys.
pub async fn compact(persistence: &Persistence) -> Result<(), Box<dyn std::error::Error>> {
    let before = persistence.store().keys().await?.len();
    let report = persistence.clean_database().await?;
    let after = persistence.store().keys().await?.len();

    println!("✓ Compaction complete");
    println!("  Keys before: {before}");
    println!("  Keys after: {after}");
    println!("  Values written: {}", report.written());
    Ok(())
}

/// Removes all stored data, optionally keeping the backup slot.
pub async fn wipe(
    persistence: &Persistence,
    keep_backup: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if keep_backup {
        persistence.clear_database_except_backup().await?;
    } else {
        persistence.clear_database(WriteMode::Regular).await?;
    }
    info!(keep_backup, "store wiped");
    println!("✓ Store wiped");
    Ok(())
}
