//! Tracked repos: remote-backed skills kept current with git.
//!
//! For tracked skills the remote is ground truth. `update` fetches the
//! clone, fast-forwards it and re-materializes every skill it holds into the
//! source tree under prefix names (see [`naming`]). Source copies edited
//! since the last materialization are reported and left alone unless forced.

pub mod git;
pub mod naming;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{Config, RESERVED_SOURCE_LABEL, TrackedRepoEntry};
use crate::core::skill::SKILL_FILE;
use crate::error::{Result, SksError};
use crate::storage::backup::BackupManager;
use crate::utils::fs::{
    EntryKind, copy_tree_filtered, entry_kind, remove_link, remove_tree, staging_path,
    tree_digest, tree_digest_filtered,
};

use naming::{belongs_to, parse_tracked_name, repo_id_from_url, tracked_skill_name, validate_repo_id};

/// Entries inside a clone that never become skill content.
fn skip_repo_metadata(rel: &Path) -> bool {
    rel.components()
        .next()
        .is_some_and(|c| c.as_os_str() == ".git")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillChange {
    Added,
    Updated,
    Unchanged,
    /// Source copy was edited locally; kept as is.
    LocallyModified,
    /// Source copy was edited locally and replaced under `force`.
    Overwritten,
    /// Gone upstream; backed up and removed from the source.
    Removed,
    /// Uninstalled earlier; not materialized.
    Excluded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillUpdate {
    pub name: String,
    pub change: SkillChange,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub repo_id: String,
    pub branch: String,
    pub previous_head: Option<String>,
    pub head: String,
    pub skills: Vec<SkillUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
}

impl UpdateReport {
    pub fn with_change(&self, change: SkillChange) -> impl Iterator<Item = &SkillUpdate> {
        self.skills.iter().filter(move |s| s.change == change)
    }

    #[must_use]
    pub fn has_unresolved(&self) -> bool {
        self.with_change(SkillChange::LocallyModified).next().is_some()
    }
}

/// Result of one repo inside `update --all`.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RepoUpdate {
    Updated(UpdateReport),
    Failed {
        repo_id: String,
        code: String,
        error: String,
    },
}

pub struct TrackedRepoManager<'a> {
    sks_root: &'a Path,
    source_root: &'a Path,
    backups: &'a BackupManager,
}

impl<'a> TrackedRepoManager<'a> {
    #[must_use]
    pub const fn new(sks_root: &'a Path, source_root: &'a Path, backups: &'a BackupManager) -> Self {
        Self {
            sks_root,
            source_root,
            backups,
        }
    }

    /// Repo entry for a repo id or a tracked skill name.
    pub fn resolve<'c>(config: &'c Config, name: &str) -> Result<&'c TrackedRepoEntry> {
        let repo_id = config
            .tracked
            .iter()
            .find(|t| t.repo_id == name)
            .map(|t| t.repo_id.as_str())
            .or_else(|| parse_tracked_name(name).map(|parsed| parsed.repo_id))
            .ok_or_else(|| SksError::RepoNotFound(name.to_string()))?;
        config
            .tracked
            .iter()
            .find(|t| t.repo_id == repo_id)
            .ok_or_else(|| SksError::RepoNotFound(name.to_string()))
    }

    /// Clone `url`, register it and materialize its skills.
    pub fn track(
        &self,
        config: &mut Config,
        url: &str,
        repo_id: Option<&str>,
        branch: Option<&str>,
    ) -> Result<UpdateReport> {
        let repo_id = match repo_id {
            Some(id) => id.to_string(),
            None => repo_id_from_url(url).ok_or_else(|| {
                SksError::ValidationFailed(format!("cannot derive a repo id from {url}"))
            })?,
        };
        validate_repo_id(&repo_id)?;
        if config.tracked.iter().any(|t| t.repo_id == repo_id) {
            return Err(SksError::ValidationFailed(format!(
                "repo {repo_id} is already tracked"
            )));
        }

        let entry = TrackedRepoEntry {
            repo_id: repo_id.clone(),
            url: url.to_string(),
            clone_path: None,
            branch: branch.map(str::to_string),
            excluded: Vec::new(),
        };
        let clone_path = entry.resolved_clone_path(self.sks_root);
        if fs::symlink_metadata(&clone_path).is_ok() {
            return Err(SksError::InvalidPath {
                path: clone_path,
                reason: "clone location already exists".to_string(),
            });
        }
        if let Some(parent) = clone_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let repo = git::clone_repo(url, &clone_path, branch)?;
        let branch = git::tracking_branch(&repo, branch)?;
        let head = git::head_oid(&repo)?;
        let report = match self.materialize(&entry, &clone_path, &BTreeMap::new(), false) {
            Ok((skills, backup_id)) => UpdateReport {
                repo_id: repo_id.clone(),
                branch,
                previous_head: None,
                head: head.to_string(),
                skills,
                backup_id,
            },
            Err(err) => {
                if let Err(cleanup) = remove_tree(&clone_path) {
                    warn!(path = %clone_path.display(), error = %cleanup, "failed to remove clone");
                }
                return Err(err);
            }
        };

        config.tracked.push(entry);
        info!(repo_id = %repo_id, url, skills = report.skills.len(), "tracking repo");
        Ok(report)
    }

    /// Fetch one repo and re-materialize its skills.
    pub fn update(&self, entry: &TrackedRepoEntry, force: bool) -> Result<UpdateReport> {
        let clone_path = entry.resolved_clone_path(self.sks_root);
        let repo = git::open(&clone_path)?;
        let branch = git::tracking_branch(&repo, entry.branch.as_deref())?;

        if git::is_dirty(&repo)? {
            if !force {
                return Err(SksError::GitOperationFailed(format!(
                    "clone {} has local modifications; use --force to discard them",
                    clone_path.display()
                )));
            }
            git::discard_local_changes(&repo)?;
        }

        // What each skill looked like when last materialized.
        let baseline = discover(&clone_path, &entry.repo_id)?
            .into_iter()
            .map(|(name, dir)| {
                tree_digest_filtered(&dir, &skip_repo_metadata).map(|digest| (name, digest))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let previous_head = git::head_oid(&repo)?;
        let remote_head = git::fetch(&repo, &branch)?;
        git::advance_to(&repo, remote_head, force)?;

        let (skills, backup_id) = self.materialize(entry, &clone_path, &baseline, force)?;
        let report = UpdateReport {
            repo_id: entry.repo_id.clone(),
            branch,
            previous_head: Some(previous_head.to_string()),
            head: remote_head.to_string(),
            skills,
            backup_id,
        };
        info!(
            repo_id = %entry.repo_id,
            head = %report.head,
            changed = report.skills.iter().filter(|s| s.change != SkillChange::Unchanged).count(),
            "updated tracked repo"
        );
        Ok(report)
    }

    /// Update every tracked repo. One failure does not stop the others.
    pub fn update_all(&self, config: &Config, force: bool) -> Vec<RepoUpdate> {
        config
            .tracked
            .iter()
            .map(|entry| match self.update(entry, force) {
                Ok(report) => RepoUpdate::Updated(report),
                Err(err) => {
                    warn!(repo_id = %entry.repo_id, error = %err, "tracked repo update failed");
                    RepoUpdate::Failed {
                        repo_id: entry.repo_id.clone(),
                        code: err.code().to_string(),
                        error: err.to_string(),
                    }
                }
            })
            .collect()
    }

    /// Bring the source tree in line with the clone's current checkout.
    ///
    /// `baseline` holds pre-fetch digests; a source copy that matches
    /// neither its baseline nor the new content was edited locally.
    fn materialize(
        &self,
        entry: &TrackedRepoEntry,
        clone_path: &Path,
        baseline: &BTreeMap<String, String>,
        force: bool,
    ) -> Result<(Vec<SkillUpdate>, Option<String>)> {
        let excluded: BTreeSet<&str> = entry.excluded.iter().map(String::as_str).collect();
        let upstream = discover(clone_path, &entry.repo_id)?;

        let mut plan: Vec<(String, SkillChange, Option<PathBuf>)> = Vec::new();
        for (name, dir) in &upstream {
            if excluded.contains(name.as_str()) {
                plan.push((name.clone(), SkillChange::Excluded, None));
                continue;
            }
            let source_copy = self.source_root.join(name);
            if entry_kind(&source_copy)? == EntryKind::Absent {
                plan.push((name.clone(), SkillChange::Added, Some(dir.clone())));
                continue;
            }
            let current = tree_digest(&source_copy)?;
            let incoming = tree_digest_filtered(dir, &skip_repo_metadata)?;
            let change = if current == incoming {
                SkillChange::Unchanged
            } else if baseline.get(name) == Some(&current) {
                SkillChange::Updated
            } else if force {
                SkillChange::Overwritten
            } else {
                SkillChange::LocallyModified
            };
            plan.push((name.clone(), change, Some(dir.clone())));
        }

        for name in self.materialized_names(&entry.repo_id)? {
            if !upstream.contains_key(&name) && !excluded.contains(name.as_str()) {
                plan.push((name, SkillChange::Removed, None));
            }
        }
        plan.sort_by(|a, b| a.0.cmp(&b.0));

        let destroyed: Vec<PathBuf> = plan
            .iter()
            .filter(|(_, change, _)| matches!(change, SkillChange::Overwritten | SkillChange::Removed))
            .map(|(name, _, _)| self.source_root.join(name))
            .collect();
        let backup_id = if destroyed.is_empty() {
            None
        } else {
            let reason = format!("update:{}", entry.repo_id);
            Some(self.backups.snapshot(RESERVED_SOURCE_LABEL, &reason, &destroyed)?.id)
        };

        let mut skills = Vec::with_capacity(plan.len());
        for (name, change, upstream_dir) in plan {
            let source_copy = self.source_root.join(&name);
            match (change, upstream_dir) {
                (SkillChange::Added, Some(dir)) => install_copy(&dir, &source_copy)?,
                (SkillChange::Updated | SkillChange::Overwritten, Some(dir)) => {
                    install_copy(&dir, &source_copy)?;
                }
                (SkillChange::Removed, _) => remove_source_copy(&source_copy)?,
                _ => {}
            }
            debug!(skill = %name, ?change, "materialized tracked skill");
            skills.push(SkillUpdate { name, change });
        }
        Ok((skills, backup_id))
    }

    /// Source skills currently carrying this repo's prefix.
    fn materialized_names(&self, repo_id: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dirent in fs::read_dir(self.source_root)? {
            let Ok(name) = dirent?.file_name().into_string() else {
                continue;
            };
            if belongs_to(&name, repo_id) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Skill directories inside a clone, keyed by their tracked name.
///
/// A directory holding `SKILL.md` is a skill; its subdirectories are part
/// of it and are not searched further. Hidden directories are skipped.
pub fn discover(clone_path: &Path, repo_id: &str) -> Result<BTreeMap<String, PathBuf>> {
    let mut found = BTreeMap::new();
    let mut walker = WalkDir::new(clone_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(clone_path)
            .map_err(|err| SksError::ValidationFailed(err.to_string()))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.iter().any(|p| p.starts_with('.')) {
            walker.skip_current_dir();
            continue;
        }
        if !entry.path().join(SKILL_FILE).is_file() {
            continue;
        }

        let nested: Vec<&str> = parts.iter().map(String::as_str).collect();
        match tracked_skill_name(repo_id, &nested) {
            Ok(name) => {
                found.insert(name, entry.path().to_path_buf());
            }
            Err(err) => warn!(path = %rel.display(), error = %err, "skipping unnameable tracked skill"),
        }
        if !parts.is_empty() {
            walker.skip_current_dir();
        }
    }
    Ok(found)
}

/// Install `upstream` at `source_copy`, replacing what is there.
fn install_copy(upstream: &Path, source_copy: &Path) -> Result<()> {
    let staging = staging_path(source_copy, "tracked");
    if let Err(err) = copy_tree_filtered(upstream, &staging, &skip_repo_metadata) {
        let _ = remove_tree(&staging);
        return Err(err);
    }
    remove_source_copy(source_copy)?;
    fs::rename(&staging, source_copy)?;
    Ok(())
}

fn remove_source_copy(path: &Path) -> Result<()> {
    match entry_kind(path)? {
        EntryKind::Symlink { .. } => remove_link(path),
        _ => remove_tree(path),
    }
}
