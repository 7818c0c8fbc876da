//! Catalog process lock
//!
//! Two digger processes working on the same catalog would race on the export
//! and on the store file. The first one takes an exclusive advisory lock on
//! `<catalog>.lock` and holds it until exit; any other fails at startup.
//!
//! Uses `fs2` (flock on Unix, LockFile on Windows).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Exclusive lock on a catalog, released on drop
#[derive(Debug)]
pub struct CatalogLock {
    file: File,
    path: PathBuf,
}

impl CatalogLock {
    /// Acquire the lock without blocking
    ///
    /// # Errors
    ///
    /// - `Error::Locked` if another process holds it
    /// - `Error::Io` if the lock file cannot be opened or written
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Not truncated before locking: the holder's PID must survive a failed attempt
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            let holder = std::fs::read_to_string(&path)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok());
            return Err(Error::Locked(match holder {
                Some(pid) => format!("{} (pid {})", path.display(), pid),
                None => path.display().to_string(),
            }));
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        tracing::debug!("Acquired catalog lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
