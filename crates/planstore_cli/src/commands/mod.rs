//! CLI command implementations.

pub mod archive;
pub mod backup;
pub mod inspect;
pub mod maintenance;
pub mod transfer;

use clap::ValueEnum;
use planstore_codec::{Compressor, DeflateCompressor, PassthroughCompressor};
use planstore_core::{ModelRegistry, Persistence, PersistenceConfig};
use planstore_storage::FileStore;
use std::path::Path;
use std::sync::Arc;

/// Codec for project archive tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    /// Raw DEFLATE, base64 tokens.
    Deflate,
    /// No compression.
    None,
}

impl Compression {
    fn compressor(self) -> Arc<dyn Compressor> {
        match self {
            Self::Deflate => Arc::new(DeflateCompressor::default()),
            Self::None => Arc::new(PassthroughCompressor),
        }
    }
}

/// Opens the task application's models over a file store at `path`.
pub fn open(path: &Path, compression: Compression) -> Result<Persistence, Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let persistence = Persistence::new(
        Arc::new(store),
        compression.compressor(),
        ModelRegistry::task_app(),
        PersistenceConfig::default(),
    )?;
    Ok(persistence)
}
