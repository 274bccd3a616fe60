//! File-based key-value store for persistent storage.
//!
//! Directory layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK                # Advisory lock for single-writer
//! ├─ <escaped key>.cbor  # One CBOR document per key
//! └─ .<random>.tmp       # Transient, one per in-flight save, renamed over the .cbor
//! ```

use crate::error::{StoreError, StoreResult};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const VALUE_EXT: &str = "cbor";
const TEMP_EXT: &str = "tmp";

/// A directory-backed key-value store.
///
/// Each key is stored as its own CBOR file. Data survives process restarts.
///
/// # Durability
///
/// Saves write a uniquely named temporary file and rename it over the
/// previous value, so a crash mid-save leaves either the old or the new
/// value, never a torn one. Concurrent saves of one key each use their own
/// temporary file; the last rename wins.
///
/// # Locking
///
/// The store holds an exclusive advisory lock on `LOCK` for its lifetime.
/// A second `FileStore` on the same directory fails with [`StoreError::Locked`].
///
/// # Example
///
/// ```no_run
/// use planstore_storage::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = FileStore::open(Path::new("planstore-data")).unwrap();
/// store.save("globalConfig", &serde_json::json!({"lang": "en"})).await.unwrap();
/// # });
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(StoreError::backend(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{}.{VALUE_EXT}", encode_key(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        let bytes = match tokio::fs::read(self.value_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = ciborium::from_reader::<Value, _>(bytes.as_slice()).map_err(|e| {
            StoreError::Corrupted {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut buffer = Vec::new();
        ciborium::into_writer(value, &mut buffer).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let dir = self.path.clone();
        let target = self.value_path(key);
        let bytes = buffer.len();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &buffer))
            .await
            .map_err(|e| StoreError::backend(format!("save task failed: {e}")))??;
        debug!(key, bytes, "wrote value file");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.value_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_all(&self) -> StoreResult<()> {
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_data = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == VALUE_EXT || ext == TEMP_EXT);
            if is_data {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(&format!(".{VALUE_EXT}")) {
                if let Some(key) = decode_key(stem) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Writes `bytes` to a fresh temporary file in `dir`, syncs it and renames
/// it over `target`. The temporary file is deleted on failure.
fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(&format!(".{TEMP_EXT}"))
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Escapes a key into a portable file name stem.
///
/// ASCII alphanumerics, `_` and `-` pass through; every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Reverses [`encode_key`]. Returns `None` for names this store did not write.
fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
