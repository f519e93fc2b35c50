//! Applier: executes a plan action by action.
//!
//! Actions are independent. A failing action is recorded against itself and
//! the rest still run; a re-run observes fresh state and picks up whatever is
//! left. A destructive action whose backup cannot be written is aborted
//! before it touches anything.

use std::fs;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::planner::{Action, ActionKind, Plan};
use crate::error::{Result, SksError};
use crate::storage::backup::BackupManager;
use crate::utils::fs::{EntryKind, atomic_symlink, entry_kind, remove_link, remove_tree, staging_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Dry run: would execute.
    Planned,
    Applied {
        #[serde(skip_serializing_if = "Option::is_none")]
        backup_id: Option<String>,
    },
    /// Conflict; the reason is carried by the action.
    Rejected,
    Failed {
        code: String,
        error: String,
    },
    /// The guarding backup could not be written; nothing was mutated.
    Aborted {
        error: String,
    },
}

impl Outcome {
    fn failed(err: &SksError) -> Self {
        Self::Failed {
            code: err.code().to_string(),
            error: err.to_string(),
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Aborted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    #[serde(flatten)]
    pub action: Action,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Success,
    /// Only conflict rejections, no failures.
    Conflicts,
    PartialFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub status: ApplyStatus,
    pub results: Vec<ActionResult>,
}

impl ApplyReport {
    fn new(dry_run: bool, results: Vec<ActionResult>) -> Self {
        let status = if results.iter().any(|r| r.outcome.is_failure()) {
            ApplyStatus::PartialFailure
        } else if results
            .iter()
            .any(|r| matches!(r.outcome, Outcome::Rejected))
        {
            ApplyStatus::Conflicts
        } else {
            ApplyStatus::Success
        };
        Self {
            dry_run,
            status,
            results,
        }
    }

    /// Failed and aborted actions.
    pub fn failures(&self) -> impl Iterator<Item = &ActionResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ActionResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Rejected))
    }

    #[must_use]
    pub fn applied(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Applied { .. }))
            .count()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.status == ApplyStatus::Success
    }
}

pub struct Applier<'a> {
    backups: &'a BackupManager,
}

impl<'a> Applier<'a> {
    #[must_use]
    pub const fn new(backups: &'a BackupManager) -> Self {
        Self { backups }
    }

    /// Execute `plan` in order. A dry run performs no I/O.
    pub fn apply(&self, plan: &Plan, dry_run: bool) -> ApplyReport {
        let results = plan
            .iter()
            .map(|action| {
                let outcome = match &action.kind {
                    ActionKind::RejectConflict { .. } => Outcome::Rejected,
                    _ if dry_run => Outcome::Planned,
                    _ => self.execute(action),
                };
                log_outcome(action, &outcome);
                ActionResult {
                    action: action.clone(),
                    outcome,
                }
            })
            .collect();

        let report = ApplyReport::new(dry_run, results);
        info!(
            dry_run,
            actions = report.results.len(),
            applied = report.applied(),
            status = ?report.status,
            "apply finished"
        );
        report
    }

    fn execute(&self, action: &Action) -> Outcome {
        let result = match &action.kind {
            ActionKind::CreateLink => create_link(action).map(|()| None),
            ActionKind::ReplaceLink { destructive: false } => replace_link(action).map(|()| None),
            ActionKind::ReplaceLink { destructive: true } => return self.replace_local(action),
            ActionKind::RemoveOrphan => remove_link(&action.path).map(|()| None),
            ActionKind::RejectConflict { .. } => return Outcome::Rejected,
        };
        match result {
            Ok(backup_id) => Outcome::Applied { backup_id },
            Err(err) => Outcome::failed(&err),
        }
    }

    /// Back up real content, move it aside, link in its place, then drop
    /// the set-aside copy.
    fn replace_local(&self, action: &Action) -> Outcome {
        let link_to = match link_destination(action) {
            Ok(dest) => dest,
            Err(err) => return Outcome::failed(&err),
        };
        let snapshot = match self
            .backups
            .snapshot(&action.target, "sync-force", &[action.path.clone()])
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                return Outcome::Aborted {
                    error: err.to_string(),
                };
            }
        };

        let aside = staging_path(&action.path, "aside");
        let swap = || -> Result<()> {
            fs::rename(&action.path, &aside)?;
            if let Err(err) = atomic_symlink(link_to, &action.path) {
                if let Err(undo) = fs::rename(&aside, &action.path) {
                    warn!(path = %aside.display(), error = %undo, "failed to move content back");
                }
                return Err(err);
            }
            remove_tree(&aside)
        };
        match swap() {
            Ok(()) => Outcome::Applied {
                backup_id: Some(snapshot.id),
            },
            Err(err) => Outcome::failed(&err),
        }
    }
}

fn link_destination(action: &Action) -> Result<&std::path::Path> {
    action.link_to.as_deref().ok_or_else(|| {
        SksError::ValidationFailed(format!("{} has no link destination", action.path.display()))
    })
}

fn create_link(action: &Action) -> Result<()> {
    let dest = link_destination(action)?;
    match entry_kind(&action.path)? {
        EntryKind::Absent => atomic_symlink(dest, &action.path),
        other => Err(SksError::ConflictLocalContent {
            target: action.target.clone(),
            detail: format!("{} appeared since observation ({other:?})", action.path.display()),
        }),
    }
}

fn replace_link(action: &Action) -> Result<()> {
    let dest = link_destination(action)?;
    match entry_kind(&action.path)? {
        EntryKind::Symlink { .. } | EntryKind::Absent => atomic_symlink(dest, &action.path),
        _ => Err(SksError::ConflictLocalContent {
            target: action.target.clone(),
            detail: format!("{} is no longer a symlink", action.path.display()),
        }),
    }
}

fn log_outcome(action: &Action, outcome: &Outcome) {
    match outcome {
        Outcome::Failed { error, .. } | Outcome::Aborted { error } => warn!(
            target_name = %action.target,
            unit = %action.unit,
            action = action.kind.label(),
            error = %error,
            "action failed"
        ),
        _ => debug!(
            target_name = %action.target,
            unit = %action.unit,
            action = action.kind.label(),
            ?outcome,
            "action processed"
        ),
    }
}
