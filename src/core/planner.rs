//! Reconciliation planner: turns observed state into an ordered action list.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::observer::{LinkState, Observation, Snapshot, Unit};
use crate::utils::fs::EntryKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Replace target-local content that shadows a source unit.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    CreateLink,
    /// Destructive when the entry being replaced is real content rather than
    /// a link; the applier backs it up first.
    ReplaceLink { destructive: bool },
    RemoveOrphan,
    /// Reported, never executed.
    RejectConflict { reason: String },
}

impl ActionKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CreateLink => "create_link",
            Self::ReplaceLink { destructive: false } => "replace_link",
            Self::ReplaceLink { destructive: true } => "replace_local",
            Self::RemoveOrphan => "remove_orphan",
            Self::RejectConflict { .. } => "reject_conflict",
        }
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::RejectConflict { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub target: String,
    pub unit: Unit,
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Entry the action operates on.
    pub path: PathBuf,
    /// Link destination for create/replace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_to: Option<PathBuf>,
    /// Observed state that produced this action.
    pub state: LinkState,
}

/// Ordered by (target name, unit). Never contains a no-op entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.kind.is_conflict())
    }
}

/// Plan one target. Deterministic for a given snapshot.
#[must_use]
pub fn plan(snapshot: &Snapshot, options: PlanOptions) -> Plan {
    let mut actions: Vec<Action> = snapshot
        .entries
        .iter()
        .filter_map(|obs| action_for(&snapshot.target.name, obs, options))
        .collect();
    actions.sort_by(|a, b| a.unit.cmp(&b.unit));
    Plan { actions }
}

/// Merge per-target plans in (target, unit) order.
#[must_use]
pub fn plan_all(snapshots: &[Snapshot], options: PlanOptions) -> Plan {
    let mut actions: Vec<Action> = snapshots
        .iter()
        .flat_map(|snapshot| plan(snapshot, options).actions)
        .collect();
    actions.sort_by(|a, b| a.target.cmp(&b.target).then_with(|| a.unit.cmp(&b.unit)));
    Plan { actions }
}

fn action_for(target: &str, obs: &Observation, options: PlanOptions) -> Option<Action> {
    let kind = match obs.state {
        LinkState::InSync => return None,
        LinkState::Missing => ActionKind::CreateLink,
        LinkState::Drifted => ActionKind::ReplaceLink { destructive: false },
        LinkState::OrphanLink => {
            // Only ever unlink something confirmed to be a link.
            if matches!(obs.entry, EntryKind::Symlink { .. }) {
                ActionKind::RemoveOrphan
            } else {
                ActionKind::RejectConflict {
                    reason: "orphan entry is not a symlink".to_string(),
                }
            }
        }
        LinkState::LocalOnly => match (&obs.expected, obs.shadows_source) {
            (Some(_), true) if options.force => ActionKind::ReplaceLink {
                destructive: !matches!(obs.entry, EntryKind::Symlink { .. }),
            },
            (Some(_), true) => ActionKind::RejectConflict {
                reason: "local content shadows a source skill; collect it or use --force"
                    .to_string(),
            },
            _ => ActionKind::RejectConflict {
                reason: "local content with no source counterpart; run collect to import it"
                    .to_string(),
            },
        },
    };

    let link_to = match kind {
        ActionKind::CreateLink | ActionKind::ReplaceLink { .. } => obs.expected.clone(),
        _ => None,
    };
    Some(Action {
        target: target.to_string(),
        unit: obs.unit.clone(),
        kind,
        path: obs.path.clone(),
        link_to,
        state: obs.state,
    })
}
