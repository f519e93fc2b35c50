//! Backup snapshots guarding every destructive action.
//!
//! Layout: `<backup_root>/<id>/manifest.json` plus `data/NNN-<basename>` per
//! captured path. Ids are UTC `YYYYMMDDTHHMMSSZ` stamps, claimed with an
//! atomic `create_dir` and suffixed `-N` on collision. Stored files are
//! sealed read-only and a snapshot is never modified after it is written.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SksError};
use crate::utils::fs::{
    EntryKind, atomic_symlink, copy_tree, entry_kind, remove_link, remove_tree, seal_tree,
    staging_path, symlink_dir, unseal_tree,
};

const MANIFEST_FILE: &str = "manifest.json";
const DATA_DIR: &str = "data";
const ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// What a stored entry was when captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredKind {
    Dir,
    File,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Live path the content was captured from.
    pub original: PathBuf,
    /// Location relative to the snapshot directory.
    pub stored: PathBuf,
    pub kind: StoredKind,
}

/// One immutable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Target name, or `source` for source-tree copies.
    pub label: String,
    /// Operation that required the backup.
    pub reason: String,
    pub entries: Vec<BackupEntry>,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl BackupSnapshot {
    /// Sort key: timestamp stamp, then collision suffix.
    fn order_key(&self) -> (String, u32) {
        parse_id(&self.id)
    }
}

fn parse_id(id: &str) -> (String, u32) {
    match id.split_once('-') {
        Some((stamp, seq)) => (stamp.to_string(), seq.parse().unwrap_or(0)),
        None => (id.to_string(), 0),
    }
}

/// Retention rule for `cleanup`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionPolicy {
    pub keep: usize,
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub restored_from: String,
    /// Snapshot of the live state taken before overwriting it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_restore_id: Option<String>,
    pub restored: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    /// Nothing is created until the first snapshot.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Copy `paths` into a new snapshot. Absent paths are skipped.
    ///
    /// Any failure removes the partial snapshot and yields
    /// `BackupWriteFailed`.
    pub fn snapshot(&self, label: &str, reason: &str, paths: &[PathBuf]) -> Result<BackupSnapshot> {
        let now = Utc::now();
        let (id, dir) = self
            .claim_dir(now)
            .map_err(|err| SksError::BackupWriteFailed(format!("claim snapshot dir: {err}")))?;

        match write_snapshot(&dir, &id, now, label, reason, paths) {
            Ok(snapshot) => {
                info!(
                    backup_id = %snapshot.id,
                    label,
                    reason,
                    entries = snapshot.entries.len(),
                    "wrote backup snapshot"
                );
                Ok(snapshot)
            }
            Err(err) => {
                if let Err(cleanup) = unseal_tree(&dir).and_then(|()| remove_tree(&dir)) {
                    warn!(dir = %dir.display(), error = %cleanup, "failed to remove partial snapshot");
                }
                Err(SksError::BackupWriteFailed(format!("{id}: {err}")))
            }
        }
    }

    fn claim_dir(&self, now: DateTime<Utc>) -> io::Result<(String, PathBuf)> {
        fs::create_dir_all(&self.root)?;
        let stamp = now.format(ID_FORMAT).to_string();
        for seq in 0u32.. {
            let id = if seq == 0 {
                stamp.clone()
            } else {
                format!("{stamp}-{seq}")
            };
            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::other("snapshot id space exhausted"))
    }

    /// All snapshots, newest first. Unreadable manifests are skipped.
    pub fn list(&self) -> Result<Vec<BackupSnapshot>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            match read_manifest(&dir) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "skipping unreadable snapshot");
                }
            }
        }
        snapshots.sort_by_key(|s| std::cmp::Reverse(s.order_key()));
        Ok(snapshots)
    }

    pub fn find(&self, id: &str) -> Result<BackupSnapshot> {
        self.list()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| SksError::BackupNotFound(id.to_string()))
    }

    /// Newest snapshot carrying `label`.
    pub fn latest_for(&self, label: &str) -> Result<BackupSnapshot> {
        self.list()?
            .into_iter()
            .find(|s| s.label == label)
            .ok_or_else(|| SksError::BackupNotFound(format!("no snapshot for {label}")))
    }

    /// Delete snapshots beyond `keep` or older than `max_age`.
    ///
    /// The newest snapshot of the considered set always survives, even
    /// with `keep = 0`.
    pub fn cleanup(
        &self,
        policy: RetentionPolicy,
        label: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let candidates: Vec<_> = self
            .list()?
            .into_iter()
            .filter(|s| label.is_none_or(|l| s.label == l))
            .collect();

        let keep = policy.keep.max(1);
        for (idx, snapshot) in candidates.into_iter().enumerate() {
            let too_old = policy.max_age.is_some_and(|max_age| {
                chrono::Duration::from_std(max_age)
                    .is_ok_and(|max_age| now.signed_duration_since(snapshot.created_at) > max_age)
            });
            let expired = idx > 0 && (idx >= keep || too_old);
            if !expired {
                report.kept.push(snapshot.id);
                continue;
            }
            unseal_tree(&snapshot.dir)?;
            remove_tree(&snapshot.dir)?;
            debug!(backup_id = %snapshot.id, "removed expired snapshot");
            report.removed.push(snapshot.id);
        }

        info!(
            removed = report.removed.len(),
            kept = report.kept.len(),
            "backup cleanup finished"
        );
        Ok(report)
    }

    /// Copy a snapshot's content back over its original paths.
    ///
    /// `id` omitted selects the newest snapshot with `label`. The live paths
    /// are snapshotted first under reason `pre-restore`.
    pub fn restore(&self, label: &str, id: Option<&str>) -> Result<RestoreReport> {
        let snapshot = match id {
            Some(id) => {
                let snapshot = self.find(id)?;
                if snapshot.label != label {
                    return Err(SksError::BackupNotFound(format!(
                        "{id} belongs to {}, not {label}",
                        snapshot.label
                    )));
                }
                snapshot
            }
            None => self.latest_for(label)?,
        };

        let live: Vec<PathBuf> = snapshot
            .entries
            .iter()
            .map(|e| e.original.clone())
            .filter(|p| fs::symlink_metadata(p).is_ok())
            .collect();
        let pre_restore_id = if live.is_empty() {
            None
        } else {
            Some(self.snapshot(label, "pre-restore", &live)?.id)
        };

        let mut restored = Vec::with_capacity(snapshot.entries.len());
        for entry in &snapshot.entries {
            restore_entry(&snapshot.dir, entry)?;
            restored.push(entry.original.clone());
        }

        info!(
            backup_id = %snapshot.id,
            label,
            restored = restored.len(),
            "restored snapshot"
        );
        Ok(RestoreReport {
            restored_from: snapshot.id,
            pre_restore_id,
            restored,
        })
    }
}

fn read_manifest(dir: &Path) -> Result<BackupSnapshot> {
    let raw = fs::read_to_string(dir.join(MANIFEST_FILE))?;
    let mut snapshot: BackupSnapshot = serde_json::from_str(&raw)?;
    snapshot.dir = dir.to_path_buf();
    Ok(snapshot)
}

fn write_snapshot(
    dir: &Path,
    id: &str,
    created_at: DateTime<Utc>,
    label: &str,
    reason: &str,
    paths: &[PathBuf],
) -> Result<BackupSnapshot> {
    let data = dir.join(DATA_DIR);
    fs::create_dir(&data)?;

    let mut entries = Vec::with_capacity(paths.len());
    for (idx, original) in paths.iter().enumerate() {
        let basename = original
            .file_name()
            .map_or_else(|| "root".to_string(), |n| n.to_string_lossy().into_owned());
        let stored = PathBuf::from(DATA_DIR).join(format!("{idx:03}-{basename}"));
        let out = dir.join(&stored);

        let kind = match entry_kind(original)? {
            EntryKind::Absent => continue,
            EntryKind::Symlink { dest } => {
                symlink_dir(&dest, &out)?;
                StoredKind::Symlink
            }
            EntryKind::Dir => {
                copy_tree(original, &out)?;
                StoredKind::Dir
            }
            EntryKind::File => {
                fs::copy(original, &out)?;
                StoredKind::File
            }
        };
        entries.push(BackupEntry {
            original: original.clone(),
            stored,
            kind,
        });
    }

    let snapshot = BackupSnapshot {
        id: id.to_string(),
        created_at,
        label: label.to_string(),
        reason: reason.to_string(),
        entries,
        dir: dir.to_path_buf(),
    };
    fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&snapshot)?,
    )?;
    seal_tree(dir)?;
    Ok(snapshot)
}

/// Replace the live path with a copy of the stored entry.
fn restore_entry(snapshot_dir: &Path, entry: &BackupEntry) -> Result<()> {
    let stored = snapshot_dir.join(&entry.stored);
    let target = &entry.original;

    if entry.kind == StoredKind::Symlink {
        let dest = fs::read_link(&stored)?;
        if matches!(entry_kind(target)?, EntryKind::Dir | EntryKind::File) {
            remove_tree(target)?;
        }
        return atomic_symlink(&dest, target);
    }

    let staging = staging_path(target, "restore");
    if let Err(err) = copy_tree(&stored, &staging).and_then(|_| unseal_tree(&staging)) {
        let _ = remove_tree(&staging);
        return Err(err);
    }
    match entry_kind(target)? {
        EntryKind::Symlink { .. } => remove_link(target)?,
        EntryKind::Dir | EntryKind::File => remove_tree(target)?,
        EntryKind::Absent => {}
    }
    fs::rename(&staging, target)?;
    debug!(path = %target.display(), "restored entry");
    Ok(())
}
