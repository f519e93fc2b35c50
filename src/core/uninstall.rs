//! Uninstall: remove a skill from every target and from the source.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, RESERVED_SOURCE_LABEL};
use crate::core::skill::{Provenance, SourceTree};
use crate::core::target::{SyncMode, TargetRegistry};
use crate::error::{Result, SksError};
use crate::security::classify_link;
use crate::storage::backup::BackupManager;
use crate::tracked::naming::belongs_to;
use crate::utils::fs::{EntryKind, entry_kind, remove_link, remove_tree};

#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    /// Back up and remove real same-named entries at targets.
    pub force: bool,
    /// Delete the backing clone when its last skill goes.
    pub remove_clone: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallReport {
    pub skill: String,
    pub unlinked: Vec<PathBuf>,
    pub removed_local: Vec<PathBuf>,
    pub left_in_place: Vec<PathBuf>,
    pub backup_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    /// The repo has no materialized skills left.
    pub clone_removable: bool,
    pub clone_removed: bool,
}

/// Remove `name` everywhere.
///
/// Every target entry is checked before anything is touched: a real
/// directory or file named after the skill fails with `UnsafeRemoval`
/// unless `force`, in which case it is backed up first. The source copy is
/// always backed up before removal. Tracked skills are added to their
/// repo's exclusion list so the next update does not bring them back.
pub fn uninstall(
    name: &str,
    options: UninstallOptions,
    config: &mut Config,
    sks_root: &Path,
    source: &SourceTree,
    registry: &TargetRegistry,
    backups: &BackupManager,
) -> Result<UninstallReport> {
    let skill = source
        .get(name)
        .ok_or_else(|| SksError::SkillNotFound(name.to_string()))?;
    let mut report = UninstallReport {
        skill: name.to_string(),
        ..UninstallReport::default()
    };

    let mut links = Vec::new();
    let mut unsafe_entries: Vec<(String, PathBuf)> = Vec::new();
    for target in registry.list() {
        if target.mode == SyncMode::Symlink {
            continue;
        }
        let path = target.path.join(name);
        match entry_kind(&path)? {
            EntryKind::Absent => {}
            EntryKind::Symlink { dest } => {
                if classify_link(&path, &dest, &source.root).is_inside() {
                    links.push(path);
                } else {
                    report.left_in_place.push(path);
                }
            }
            EntryKind::Dir | EntryKind::File => unsafe_entries.push((target.name.clone(), path)),
        }
    }

    if !unsafe_entries.is_empty() && !options.force {
        let listed: Vec<_> = unsafe_entries
            .iter()
            .map(|(_, p)| p.display().to_string())
            .collect();
        return Err(SksError::UnsafeRemoval(format!(
            "real content named {name} at: {}",
            listed.join(", ")
        )));
    }

    for (target, path) in unsafe_entries {
        let snapshot = backups.snapshot(&target, "uninstall", std::slice::from_ref(&path))?;
        report.backup_ids.push(snapshot.id);
        remove_tree(&path)?;
        report.removed_local.push(path);
    }
    for link in links {
        remove_link(&link)?;
        report.unlinked.push(link);
    }

    let snapshot = backups.snapshot(RESERVED_SOURCE_LABEL, "uninstall", &[skill.path.clone()])?;
    report.backup_ids.push(snapshot.id);
    match entry_kind(&skill.path)? {
        EntryKind::Symlink { .. } => remove_link(&skill.path)?,
        _ => remove_tree(&skill.path)?,
    }

    if let Provenance::Tracked { repo_id } = &skill.provenance {
        forget_tracked(name, repo_id, options, config, sks_root, source, &mut report)?;
    }

    info!(
        skill = %name,
        unlinked = report.unlinked.len(),
        removed_local = report.removed_local.len(),
        "uninstalled skill"
    );
    Ok(report)
}

fn forget_tracked(
    name: &str,
    repo_id: &str,
    options: UninstallOptions,
    config: &mut Config,
    sks_root: &Path,
    source: &SourceTree,
    report: &mut UninstallReport,
) -> Result<()> {
    report.repo_id = Some(repo_id.to_string());
    let Some(idx) = config.tracked.iter().position(|t| t.repo_id == repo_id) else {
        warn!(repo_id, "tracked repo is no longer configured");
        return Ok(());
    };

    let entry = &mut config.tracked[idx];
    if !entry.excluded.iter().any(|e| e == name) {
        entry.excluded.push(name.to_string());
        entry.excluded.sort();
    }

    report.clone_removable = !source
        .names()
        .any(|other| other != name && belongs_to(other, repo_id));
    if report.clone_removable && options.remove_clone {
        let clone_path = entry.resolved_clone_path(sks_root);
        remove_tree(&clone_path)?;
        config.tracked.remove(idx);
        report.clone_removed = true;
        info!(repo_id, path = %clone_path.display(), "removed tracked clone");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackedRepoEntry;
    use crate::test_utils::fixtures::UnitTestFixture;
    use std::collections::BTreeSet;
    use std::fs;

    fn registry(fixture: &UnitTestFixture) -> TargetRegistry {
        let mut registry = TargetRegistry::default();
        registry
            .add(
                "t1",
                &fixture.target("t1", SyncMode::Merge).path,
                SyncMode::Merge,
                &fixture.skills_root(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn removes_links_and_source_copy_with_backup() {
        let fixture = UnitTestFixture::new();
        fixture.create_skill("alpha", "# alpha");
        let registry = registry(&fixture);
        let t1 = registry.get("t1").unwrap().clone();
        fixture.link(&t1, "alpha", &fixture.skills_root().join("alpha"));
        let backups = fixture.backups();

        let report = uninstall(
            "alpha",
            UninstallOptions::default(),
            &mut Config::default(),
            &fixture.data_path,
            &fixture.source(),
            &registry,
            &backups,
        )
        .unwrap();
        assert_eq!(report.unlinked, vec![t1.path.join("alpha")]);
        assert!(!fixture.skills_root().join("alpha").exists());
        assert_eq!(backups.latest_for("source").unwrap().reason, "uninstall");
    }

    #[test]
    fn real_target_copy_blocks_without_force() {
        let fixture = UnitTestFixture::new();
        fixture.create_skill("alpha", "# alpha");
        let registry = registry(&fixture);
        let t1 = registry.get("t1").unwrap().clone();
        fixture.create_local_skill(&t1, "alpha", "# local");
        let backups = fixture.backups();

        let err = uninstall(
            "alpha",
            UninstallOptions::default(),
            &mut Config::default(),
            &fixture.data_path,
            &fixture.source(),
            &registry,
            &backups,
        )
        .unwrap_err();
        assert!(matches!(err, SksError::UnsafeRemoval(_)));
        assert!(fixture.skills_root().join("alpha").exists());
        assert!(t1.path.join("alpha").exists());

        let report = uninstall(
            "alpha",
            UninstallOptions {
                force: true,
                remove_clone: false,
            },
            &mut Config::default(),
            &fixture.data_path,
            &fixture.source(),
            &registry,
            &backups,
        )
        .unwrap();
        assert_eq!(report.removed_local, vec![t1.path.join("alpha")]);
        assert_eq!(report.backup_ids.len(), 2);
    }

    #[test]
    fn tracked_skill_is_excluded_and_last_one_frees_clone() {
        let fixture = UnitTestFixture::new();
        fixture.create_skill("_team__lint", "# lint");
        let clone = fixture.data_path.join("repos/team");
        fs::create_dir_all(clone.join(".git")).unwrap();
        let mut config = Config::default();
        config.tracked.push(TrackedRepoEntry {
            repo_id: "team".to_string(),
            url: "https://example.com/team.git".to_string(),
            clone_path: None,
            branch: None,
            excluded: Vec::new(),
        });
        let source =
            SourceTree::scan(&fixture.skills_root(), &BTreeSet::from(["team".to_string()])).unwrap();

        let report = uninstall(
            "_team__lint",
            UninstallOptions {
                force: false,
                remove_clone: true,
            },
            &mut config,
            &fixture.data_path,
            &source,
            &TargetRegistry::default(),
            &fixture.backups(),
        )
        .unwrap();
        assert_eq!(report.repo_id.as_deref(), Some("team"));
        assert!(report.clone_removable);
        assert!(report.clone_removed);
        assert!(!clone.exists());
        assert!(config.tracked.is_empty());
    }

    #[test]
    fn unknown_skill_is_reported() {
        let fixture = UnitTestFixture::new();
        let err = uninstall(
            "ghost",
            UninstallOptions::default(),
            &mut Config::default(),
            &fixture.data_path,
            &fixture.source(),
            &TargetRegistry::default(),
            &fixture.backups(),
        )
        .unwrap_err();
        assert!(matches!(err, SksError::SkillNotFound(_)));
    }
}
