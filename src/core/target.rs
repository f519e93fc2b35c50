//! Target registry: named tool directories and how they are linked.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, RESERVED_SOURCE_LABEL, TargetEntry};
use crate::core::observer::{LinkState, observe};
use crate::core::skill::SourceTree;
use crate::error::{Result, SksError};
use crate::security::{
    LinkDestination, classify_link, paths_overlap, resolve_existing, validate_path_component,
};
use crate::storage::backup::BackupManager;
use crate::utils::fs::{EntryKind, entry_kind, expand_tilde, remove_link, remove_tree};

/// How a target is kept in sync with the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// One symlink per skill inside a real directory; leaves room for
    /// target-local additions.
    #[default]
    Merge,
    /// The whole target directory is a single symlink to the source root.
    Symlink,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Symlink => write!(f, "symlink"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = SksError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "symlink" | "link" => Ok(Self::Symlink),
            other => Err(SksError::ValidationFailed(format!(
                "invalid sync mode {other} (expected merge|symlink)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: String,
    pub path: PathBuf,
    pub mode: SyncMode,
}

/// Default skills directories of well-known agent tools.
pub const KNOWN_TARGETS: &[(&str, &str)] = &[
    ("claude", "~/.claude/skills"),
    ("codex", "~/.codex/skills"),
    ("cursor", "~/.cursor/skills"),
    ("gemini", "~/.gemini/skills"),
    ("opencode", "~/.config/opencode/skills"),
];

#[must_use]
pub fn default_path_for(name: &str) -> Option<PathBuf> {
    KNOWN_TARGETS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, path)| expand_tilde(path))
}

/// Reject a target that would sit inside the source tree or contain it.
///
/// A symlink-mode target path is itself a link into the source once
/// synced, so only its parents are resolved.
pub fn ensure_disjoint_from_source(path: &Path, mode: SyncMode, source_root: &Path) -> Result<()> {
    let resolved = match (mode, path.parent(), path.file_name()) {
        (SyncMode::Symlink, Some(parent), Some(name)) => resolve_existing(parent).join(name),
        _ => resolve_existing(path),
    };
    let source = resolve_existing(source_root);
    if paths_overlap(&resolved, &source) {
        return Err(SksError::InvalidPath {
            path: path.to_path_buf(),
            reason: format!("overlaps the source tree {}", source.display()),
        });
    }
    Ok(())
}

/// What `TargetRegistry::remove` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemovalReport {
    pub target: String,
    pub unlinked: Vec<PathBuf>,
    pub removed_local: Vec<PathBuf>,
    pub left_in_place: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

impl TargetRegistry {
    pub fn from_config(config: &Config) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|entry| {
                (
                    entry.name.clone(),
                    Target {
                        name: entry.name.clone(),
                        path: entry.resolved_path(),
                        mode: entry.mode,
                    },
                )
            })
            .collect();
        Self { targets }
    }

    /// Replace the config's target list with the registry contents.
    pub fn write_into(&self, config: &mut Config) {
        config.targets = self
            .targets
            .values()
            .map(|t| TargetEntry {
                name: t.name.clone(),
                path: t.path.display().to_string(),
                mode: t.mode,
            })
            .collect();
    }

    /// Targets sorted by name.
    pub fn list(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn get(&self, name: &str) -> Result<&Target> {
        self.targets
            .get(name)
            .ok_or_else(|| SksError::TargetNotFound(name.to_string()))
    }

    /// One target by name, or all of them.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&Target>> {
        match name {
            Some(name) => Ok(vec![self.get(name)?]),
            None => Ok(self.list().collect()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn add(
        &mut self,
        name: &str,
        path: &Path,
        mode: SyncMode,
        source_root: &Path,
    ) -> Result<&Target> {
        validate_path_component(name)?;
        if name == RESERVED_SOURCE_LABEL {
            return Err(SksError::ValidationFailed(format!(
                "target name {name:?} is reserved"
            )));
        }
        if self.targets.contains_key(name) {
            return Err(SksError::DuplicateTarget(name.to_string()));
        }
        if !path.is_absolute() {
            return Err(SksError::InvalidPath {
                path: path.to_path_buf(),
                reason: "target path must be absolute".to_string(),
            });
        }
        ensure_disjoint_from_source(path, mode, source_root)?;

        let creatable = match mode {
            SyncMode::Merge => match entry_kind(path)? {
                EntryKind::File => Err("path exists and is a file".to_string()),
                EntryKind::Absent => fs::create_dir_all(path).map_err(|err| err.to_string()),
                _ => Ok(()),
            },
            SyncMode::Symlink => path
                .parent()
                .map_or(Ok(()), |parent| fs::create_dir_all(parent).map_err(|err| err.to_string())),
        };
        creatable.map_err(|reason| SksError::InvalidPath {
            path: path.to_path_buf(),
            reason,
        })?;

        info!(target_name = %name, path = %path.display(), %mode, "registered target");
        let target = Target {
            name: name.to_string(),
            path: path.to_path_buf(),
            mode,
        };
        Ok(self.targets.entry(name.to_string()).or_insert(target))
    }

    /// Unregister a target, unlinking only what points into the source.
    ///
    /// Real directories or files at the target are refused with
    /// `UnsafeRemoval` before anything is touched. With `force` they are
    /// snapshotted first and then removed. Links that point elsewhere are
    /// left in place.
    pub fn remove(
        &mut self,
        name: &str,
        force: bool,
        source: &SourceTree,
        backups: &BackupManager,
    ) -> Result<RemovalReport> {
        let target = self.get(name)?.clone();
        let mut report = RemovalReport {
            target: name.to_string(),
            ..RemovalReport::default()
        };
        let mut owned_links = Vec::new();
        let mut unsafe_entries = Vec::new();

        match entry_kind(&target.path)? {
            EntryKind::Absent => {}
            EntryKind::Symlink { dest } => {
                if classify_link(&target.path, &dest, &source.root) == LinkDestination::Root {
                    owned_links.push(target.path.clone());
                } else {
                    report.left_in_place.push(target.path.clone());
                }
            }
            EntryKind::File => unsafe_entries.push(target.path.clone()),
            EntryKind::Dir if target.mode == SyncMode::Symlink => {
                unsafe_entries.push(target.path.clone());
            }
            EntryKind::Dir => {
                let mut entries: Vec<_> = fs::read_dir(&target.path)?
                    .filter_map(std::result::Result::ok)
                    .map(|e| e.path())
                    .collect();
                entries.sort();
                for entry in entries {
                    let hidden = entry
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with('.'));
                    match entry_kind(&entry)? {
                        EntryKind::Symlink { dest } => {
                            if classify_link(&entry, &dest, &source.root).is_inside() {
                                owned_links.push(entry);
                            } else {
                                report.left_in_place.push(entry);
                            }
                        }
                        EntryKind::Dir if !hidden => unsafe_entries.push(entry),
                        _ => report.left_in_place.push(entry),
                    }
                }
            }
        }

        if !unsafe_entries.is_empty() {
            if !force {
                let listed: Vec<_> = unsafe_entries
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                return Err(SksError::UnsafeRemoval(format!(
                    "target {name} holds real content: {}",
                    listed.join(", ")
                )));
            }
            let snapshot = backups.snapshot(name, "target-remove", &unsafe_entries)?;
            report.backup_id = Some(snapshot.id);
            for entry in unsafe_entries {
                remove_tree(&entry)?;
                report.removed_local.push(entry);
            }
        }

        for link in owned_links {
            remove_link(&link)?;
            report.unlinked.push(link);
        }

        if target.mode == SyncMode::Merge
            && entry_kind(&target.path)? == EntryKind::Dir
            && report.left_in_place.is_empty()
        {
            if let Err(err) = fs::remove_dir(&target.path) {
                debug!(path = %target.path.display(), error = %err, "target directory kept");
            }
        }

        self.targets.remove(name);
        info!(
            target_name = %name,
            unlinked = report.unlinked.len(),
            removed_local = report.removed_local.len(),
            "removed target"
        );
        Ok(report)
    }

    /// Switch a target's mode, converting its on-disk topology.
    ///
    /// merge → symlink needs the target to hold only in-sync links; they and
    /// the emptied directory are removed so the next sync can place the
    /// directory link. symlink → merge drops the directory link and creates a
    /// real directory for per-skill links.
    pub fn set_mode(&mut self, name: &str, mode: SyncMode, source: &SourceTree) -> Result<()> {
        let target = self.get(name)?.clone();
        if target.mode == mode {
            return Ok(());
        }

        match mode {
            SyncMode::Symlink => {
                let snapshot = observe(source, &target)?;
                let blocking: Vec<_> = snapshot
                    .entries
                    .iter()
                    .filter(|obs| !matches!(obs.state, LinkState::InSync | LinkState::Missing))
                    .map(|obs| format!("{} ({})", obs.unit, obs.state))
                    .collect();
                if !blocking.is_empty() {
                    return Err(SksError::ConflictLocalContent {
                        target: name.to_string(),
                        detail: blocking.join(", "),
                    });
                }

                if entry_kind(&target.path)? == EntryKind::Dir {
                    let in_sync: Vec<_> = snapshot
                        .entries
                        .iter()
                        .filter(|obs| obs.state == LinkState::InSync)
                        .map(|obs| obs.path.clone())
                        .collect();
                    let stray: Vec<_> = fs::read_dir(&target.path)?
                        .filter_map(std::result::Result::ok)
                        .map(|e| e.path())
                        .filter(|p| !in_sync.contains(p))
                        .collect();
                    if !stray.is_empty() {
                        return Err(SksError::ConflictLocalContent {
                            target: name.to_string(),
                            detail: format!("{} non-skill entries remain", stray.len()),
                        });
                    }
                    for link in &in_sync {
                        remove_link(link)?;
                    }
                    fs::remove_dir(&target.path)?;
                }
            }
            SyncMode::Merge => match entry_kind(&target.path)? {
                EntryKind::Symlink { dest } => {
                    if !classify_link(&target.path, &dest, &source.root).is_inside() {
                        return Err(SksError::ConflictLocalContent {
                            target: name.to_string(),
                            detail: format!("{} links outside the source", target.path.display()),
                        });
                    }
                    remove_link(&target.path)?;
                    fs::create_dir_all(&target.path)?;
                }
                EntryKind::Absent => fs::create_dir_all(&target.path)?,
                EntryKind::Dir => {}
                EntryKind::File => {
                    return Err(SksError::ConflictLocalContent {
                        target: name.to_string(),
                        detail: format!("{} is a file", target.path.display()),
                    });
                }
            },
        }

        if let Some(entry) = self.targets.get_mut(name) {
            entry.mode = mode;
        } else {
            warn!(target_name = %name, "target vanished during mode switch");
        }
        info!(target_name = %name, from = %target.mode, to = %mode, "switched target mode");
        Ok(())
    }
}
