//! Advisory process lock for mutating commands.
//!
//! Two invocations that both mutate the source or a target would race on
//! the same entries, so every mutating command holds `<root>/sks.lock` for
//! its whole run. Read-only commands never take it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SksError};

/// Exclusive lock held until dropped.
#[derive(Debug)]
pub struct SourceLock {
    file: File,
    lock_path: PathBuf,
}

impl SourceLock {
    pub const LOCK_FILENAME: &'static str = "sks.lock";

    /// Take the lock without blocking. A held lock fails with `Locked`.
    pub fn acquire(sks_root: &Path) -> Result<Self> {
        let lock_path = sks_root.join(Self::LOCK_FILENAME);
        fs::create_dir_all(sks_root)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == io::ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                let holder = Self::read_lock_info(sks_root).map_or_else(
                    || "unknown holder".to_string(),
                    |info| format!("pid {} since {}", info.pid, info.acquired_at.to_rfc3339()),
                );
                return Err(SksError::Locked {
                    path: lock_path,
                    holder,
                });
            }
            return Err(err.into());
        }

        Self::write_lock_info(&file)?;
        debug!(path = %lock_path.display(), "acquired source lock");
        Ok(Self { file, lock_path })
    }

    fn write_lock_info(file: &File) -> Result<()> {
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let mut file = file;
        file.set_len(0)?;
        file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Holder info of the last acquisition, if readable.
    pub fn read_lock_info(sks_root: &Path) -> Option<LockInfo> {
        let content = fs::read_to_string(sks_root.join(Self::LOCK_FILENAME)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!(path = %self.lock_path.display(), "released source lock"),
            Err(err) => debug!(error = %err, "failed to release source lock"),
        }
    }
}

/// Information about the lock holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}
