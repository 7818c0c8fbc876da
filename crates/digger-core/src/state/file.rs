// # File Record Store
//
// File-based implementation of RecordStore with crash recovery.
//
// ## Purpose
//
// Keeps site state and the change log across runs in a single JSON
// document. Every commit rewrites the document, so one commit is one
// durable, all-or-nothing unit.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
// - No silent reset: a corrupt file without a usable backup fails to open
//   and is left on disk untouched
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "sites": {
//     "sftp.vendor.example": { "hostname": "sftp.vendor.example", "known_ips": ["10.0.0.2"], ... }
//   },
//   "changes": {
//     "sftp.vendor.example-2025-01-09T12:00:00.000000000Z": { "old_ips": ["10.0.0.1"], ... }
//   }
// }
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::BucketSet;
use crate::Error;
use crate::traits::{Bucket, RecordStore, WriteBatch};

/// Refuse to start over on top of change history we could not read
fn unrecoverable(path: &Path, reason: &str, backup: &str) -> Error {
    tracing::error!("Store file {} is corrupt and cannot be recovered", path.display());
    Error::store(format!(
        "Store file {} is corrupt ({}) and {}; move it aside to start a new store",
        path.display(),
        reason,
        backup
    ))
}

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based record store with crash recovery
///
/// The whole document is held in memory behind a RwLock. A commit takes the
/// write lock, applies the batch to a copy, writes the copy to disk and only
/// then swaps it in, so a failed write leaves both disk and memory untouched.
///
/// # Example
///
/// ```rust,no_run
/// use digger_core::state::FileRecordStore;
/// use digger_core::traits::{Bucket, RecordStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRecordStore::open("/var/lib/digger/store.json").await?;
///     println!("{} changes recorded", store.count(Bucket::Changes).await?);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    state: RwLock<BucketSet>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(flatten)]
    buckets: BucketSet,
}

/// Why a load attempt failed
enum LoadFailure {
    /// File exists but is not a valid store document
    Corrupt(String),
    /// File could not be read
    Io(Error),
}

impl FileRecordStore {
    /// Open or create a file record store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If corruption detected, try to load from backup
    /// 4. If the backup is missing or also corrupt, fail with `Error::Store`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let buckets = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: RwLock::new(buckets),
        })
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load buckets from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<BucketSet, Error> {
        match Self::load(path).await {
            Ok(buckets) => {
                tracing::debug!(
                    "Loaded store from {}: {} sites, {} changes",
                    path.display(),
                    buckets.bucket(Bucket::Sites).len(),
                    buckets.bucket(Bucket::Changes).len()
                );
                Ok(buckets)
            }
            Err(LoadFailure::Io(e)) => Err(e),
            Err(LoadFailure::Corrupt(reason)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    reason
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    return Err(unrecoverable(path, &reason, "no backup file"));
                }

                match Self::load(&backup_path).await {
                    Ok(buckets) => {
                        tracing::info!(
                            "Recovered store from backup: {} sites, {} changes",
                            buckets.bucket(Bucket::Sites).len(),
                            buckets.bucket(Bucket::Changes).len()
                        );
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore store file from backup: {}", e);
                        }
                        Ok(buckets)
                    }
                    Err(LoadFailure::Corrupt(backup_reason)) => Err(unrecoverable(
                        path,
                        &reason,
                        &format!("backup also corrupt: {}", backup_reason),
                    )),
                    Err(LoadFailure::Io(e)) => Err(e),
                }
            }
        }
    }

    /// Load buckets from one file
    async fn load(path: &Path) -> Result<BucketSet, LoadFailure> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(BucketSet::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadFailure::Io(Error::store(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)
            .map_err(|e| LoadFailure::Corrupt(format!("{}: {}", path.display(), e)))?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.buckets)
    }

    /// Write buckets to the store file atomically
    async fn write(&self, buckets: &BucketSet) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            buckets: buckets.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::store(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.sync_all().await.map_err(|e| {
                Error::store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Value>, Error> {
        let guard = self.state.read().await;
        Ok(guard.bucket(bucket).get(key).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        next.apply(batch)?;
        self.write(&next).await?;
        *guard = next;
        Ok(())
    }

    async fn for_each(
        &self,
        bucket: Bucket,
        visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v Value) + Send),
    ) -> Result<(), Error> {
        let guard = self.state.read().await;
        for (key, value) in guard.bucket(bucket) {
            visitor(key, value);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every commit is written through
        Ok(())
    }
}
