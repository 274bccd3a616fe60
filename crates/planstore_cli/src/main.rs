//! planstore CLI
//!
//! Command-line tools for planstore data directories.
//!
//! # Commands
//!
//! - `inspect` - Display stored keys, models and projects
//! - `export` / `import` - Move complete snapshots in and out as JSON
//! - `export-project` - Export one project with its related data
//! - `backup` / `restore-backup` - Manage the backup slot
//! - `archive` / `unarchive` - Move a project in and out of the archive
//! - `compact` - Rewrite the store under current keys
//! - `wipe` - Clear the store

mod commands;

use clap::{Parser, Subcommand};
use commands::Compression;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// planstore command-line data tools.
#[derive(Parser)]
#[command(name = "planstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Codec used for project archives
    #[arg(global = true, long, value_enum, default_value_t = Compression::Deflate)]
    compression: Compression,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display stored keys, models and projects
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write the complete snapshot as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace all data with a snapshot read from a JSON file
    Import {
        /// Snapshot file
        input: PathBuf,
    },

    /// Write one project and its related data as JSON
    ExportProject {
        /// Project id
        project_id: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store the current snapshot in the backup slot
    Backup,

    /// Import the snapshot held in the backup slot
    RestoreBackup,

    /// Archive a project's related data
    Archive {
        /// Project id
        project_id: String,
    },

    /// Restore a project's related data from the archive
    Unarchive {
        /// Project id
        project_id: String,
    },

    /// Rewrite all data under current keys, dropping stale entries
    Compact,

    /// Remove all stored data
    Wipe {
        /// Keep the backup slot
        #[arg(long)]
        keep_backup: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("planstore CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Data directory path required")?;
    let persistence = commands::open(&path, cli.compression)?;

    match cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&persistence, &path, &format).await?;
        }
        Commands::Export { output } => {
            commands::transfer::export(&persistence, output.as_deref()).await?;
        }
        Commands::Import { input } => {
            commands::transfer::import(&persistence, &input).await?;
        }
        Commands::ExportProject { project_id, output } => {
            commands::transfer::export_project(&persistence, &project_id, output.as_deref())
                .await?;
        }
        Commands::Backup => commands::backup::create(&persistence).await?,
        Commands::RestoreBackup => commands::backup::restore(&persistence).await?,
        Commands::Archive { project_id } => {
            commands::archive::archive(&persistence, &project_id).await?;
        }
        Commands::Unarchive { project_id } => {
            commands::archive::unarchive(&persistence, &project_id).await?;
        }
        Commands::Compact => commands::maintenance::compact(&persistence).await?,
        Commands::Wipe { keep_backup } => {
            commands::maintenance::wipe(&persistence, keep_backup).await?;
        }
        Commands::Version => {}
    }

    Ok(())
}
