//! Collector: imports target-local skills back into the source tree.
//!
//! Collection never creates links. A collected skill is moved into the
//! source and its local copy cleared (after a backup), so the following
//! `sync` links it like any other source skill.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RESERVED_SOURCE_LABEL;
use crate::core::observer::{LinkState, Observation, Snapshot, Unit};
use crate::core::target::SyncMode;
use crate::error::{Result, SksError};
use crate::security::validate_path_component;
use crate::storage::backup::BackupManager;
use crate::utils::fs::{
    EntryKind, copy_tree, copy_tree_atomic, entry_kind, remove_link, remove_tree, staging_path,
    tree_digest,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    pub dry_run: bool,
    /// On content conflict the target copy wins.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectKind {
    /// New to the source.
    Import,
    /// Identical copy already in the source; only the local copy is cleared.
    Reconcile,
    /// Differs from the source and `force` was given.
    Overwrite,
    /// Differs from the source; left alone.
    Conflict,
    Skip { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Planned,
    Done,
    NotApplied,
    /// Left alone because source and target copies differ.
    Conflicted { code: String, error: String },
    Failed { code: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectItem {
    pub target: String,
    pub skill: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: CollectKind,
    #[serde(flatten)]
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backup_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub dry_run: bool,
    pub items: Vec<CollectItem>,
}

impl CollectReport {
    pub fn conflicts(&self) -> impl Iterator<Item = &CollectItem> {
        self.items.iter().filter(|i| i.kind == CollectKind::Conflict)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CollectItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Failed { .. }))
    }

    /// Whether anything was left for the user to resolve.
    #[must_use]
    pub fn has_unresolved(&self) -> bool {
        self.conflicts().next().is_some() || self.failures().next().is_some()
    }

    #[must_use]
    pub fn imported(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| {
                matches!(i.kind, CollectKind::Import | CollectKind::Overwrite)
                    && matches!(i.status, ItemStatus::Planned | ItemStatus::Done)
            })
            .map(|i| i.skill.as_str())
            .collect()
    }
}

pub struct Collector<'a> {
    backups: &'a BackupManager,
}

impl<'a> Collector<'a> {
    #[must_use]
    pub const fn new(backups: &'a BackupManager) -> Self {
        Self { backups }
    }

    /// Collect LocalOnly skills from `snapshots`, in (target, skill) order.
    pub fn collect(&self, snapshots: &[Snapshot], options: CollectOptions) -> CollectReport {
        let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
        ordered.sort_by(|a, b| a.target.name.cmp(&b.target.name));

        // Digests of content a dry run would have imported, so later targets
        // compare against it as a real run would.
        let mut pending: BTreeMap<String, String> = BTreeMap::new();
        let mut report = CollectReport {
            dry_run: options.dry_run,
            items: Vec::new(),
        };

        for snapshot in ordered {
            if snapshot.target.mode == SyncMode::Symlink {
                debug!(target_name = %snapshot.target.name, "symlink-mode target has nothing to collect");
                continue;
            }
            for obs in &snapshot.entries {
                if obs.state != LinkState::LocalOnly {
                    continue;
                }
                let Unit::Skill(name) = &obs.unit else {
                    continue;
                };
                let item = self.collect_one(snapshot, name, obs, options, &mut pending);
                report.items.push(item);
            }
        }

        info!(
            dry_run = options.dry_run,
            items = report.items.len(),
            conflicts = report.conflicts().count(),
            "collect finished"
        );
        report
    }

    fn collect_one(
        &self,
        snapshot: &Snapshot,
        name: &str,
        obs: &Observation,
        options: CollectOptions,
        pending: &mut BTreeMap<String, String>,
    ) -> CollectItem {
        let target = snapshot.target.name.as_str();
        let mut item = CollectItem {
            target: target.to_string(),
            skill: name.to_string(),
            path: obs.path.clone(),
            kind: CollectKind::Conflict,
            status: ItemStatus::Planned,
            backup_ids: Vec::new(),
        };

        if let Some(reason) = skip_reason(name, obs) {
            item.kind = CollectKind::Skip { reason };
            item.status = ItemStatus::NotApplied;
            return item;
        }

        let source_copy = snapshot.source_root.join(name);
        let kind = match classify(&obs.path, &source_copy, pending.get(name)) {
            Ok(kind) => kind,
            Err(err) => {
                item.status = failed(&err);
                return item;
            }
        };
        item.kind = match kind {
            CollectKind::Overwrite if !options.force => CollectKind::Conflict,
            other => other,
        };

        if item.kind == CollectKind::Conflict {
            let err = SksError::ContentConflict {
                skill: name.to_string(),
                target: target.to_string(),
            };
            warn!(target_name = %target, skill = %name, code = err.code(), "content conflict; skipped");
            item.status = ItemStatus::Conflicted {
                code: err.code().to_string(),
                error: err.to_string(),
            };
            return item;
        }
        if options.dry_run {
            if item.kind == CollectKind::Import {
                if let Ok(digest) = tree_digest(&obs.path) {
                    pending.insert(name.to_string(), digest);
                }
            }
            return item;
        }

        match self.execute(target, &item.kind, &obs.path, &source_copy) {
            Ok(backup_ids) => {
                item.backup_ids = backup_ids;
                item.status = ItemStatus::Done;
                info!(target_name = %target, skill = %name, kind = ?item.kind, "collected skill");
            }
            Err(err) => {
                warn!(target_name = %target, skill = %name, error = %err, "collect failed");
                item.status = failed(&err);
            }
        }
        item
    }

    fn execute(
        &self,
        target: &str,
        kind: &CollectKind,
        local: &Path,
        source_copy: &Path,
    ) -> Result<Vec<String>> {
        let mut backup_ids = Vec::new();
        match kind {
            CollectKind::Import => {
                copy_tree_atomic(local, source_copy)?;
                if tree_digest(local)? != tree_digest(source_copy)? {
                    remove_tree(source_copy)?;
                    return Err(SksError::ValidationFailed(format!(
                        "imported copy of {} does not match",
                        local.display()
                    )));
                }
            }
            CollectKind::Reconcile => {}
            CollectKind::Overwrite => {
                let snapshot = self.backups.snapshot(
                    RESERVED_SOURCE_LABEL,
                    "collect-overwrite",
                    &[source_copy.to_path_buf()],
                )?;
                backup_ids.push(snapshot.id);
                replace_source_copy(local, source_copy)?;
            }
            CollectKind::Conflict | CollectKind::Skip { .. } => return Ok(backup_ids),
        }

        let snapshot = self
            .backups
            .snapshot(target, "collect", &[local.to_path_buf()])?;
        backup_ids.push(snapshot.id);
        clear_local(local)?;
        Ok(backup_ids)
    }
}

fn failed(err: &SksError) -> ItemStatus {
    ItemStatus::Failed {
        code: err.code().to_string(),
        error: err.to_string(),
    }
}

fn skip_reason(name: &str, obs: &Observation) -> Option<String> {
    if let Err(err) = validate_path_component(name) {
        return Some(err.to_string());
    }
    match &obs.entry {
        EntryKind::Dir => None,
        EntryKind::Symlink { .. } if obs.path.is_dir() => None,
        EntryKind::Symlink { .. } => Some("link does not resolve to a directory".to_string()),
        _ => Some("not a skill directory".to_string()),
    }
}

/// Decide between import, reconcile and overwrite by comparing digests.
fn classify(local: &Path, source_copy: &Path, pending: Option<&String>) -> Result<CollectKind> {
    let source_digest = match (pending, entry_kind(source_copy)?) {
        (Some(digest), _) => digest.clone(),
        (None, EntryKind::Absent) => return Ok(CollectKind::Import),
        (None, _) => tree_digest(source_copy)?,
    };
    if tree_digest(local)? == source_digest {
        Ok(CollectKind::Reconcile)
    } else {
        Ok(CollectKind::Overwrite)
    }
}

/// Swap the source copy for the target content via a staging sibling.
fn replace_source_copy(local: &Path, source_copy: &Path) -> Result<()> {
    let staging = staging_path(source_copy, "collect");
    if let Err(err) = copy_tree(local, &staging) {
        let _ = remove_tree(&staging);
        return Err(err);
    }
    let aside = staging_path(source_copy, "aside");
    fs::rename(source_copy, &aside)?;
    if let Err(err) = fs::rename(&staging, source_copy) {
        if let Err(undo) = fs::rename(&aside, source_copy) {
            warn!(path = %aside.display(), error = %undo, "failed to move source copy back");
        }
        let _ = remove_tree(&staging);
        return Err(err.into());
    }
    match entry_kind(&aside)? {
        EntryKind::Symlink { .. } => remove_link(&aside),
        _ => remove_tree(&aside),
    }
}

fn clear_local(local: &Path) -> Result<()> {
    match entry_kind(local)? {
        EntryKind::Symlink { .. } => remove_link(local),
        _ => remove_tree(local),
    }
}
