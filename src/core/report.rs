//! Read-only reports built from observer snapshots.
//!
//! None of these touch the filesystem; they only reshape what the observer
//! already saw, so `status`, `diff` and `list` agree with `sync --dry-run`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::observer::{LinkState, Snapshot, Unit};
use crate::core::skill::{Provenance, SkillMetadata, SourceTree};
use crate::core::target::SyncMode;
use crate::utils::fs::EntryKind;

#[derive(Debug, Clone, Serialize)]
pub struct UnitState {
    pub unit: Unit,
    pub state: LinkState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub target: String,
    pub mode: SyncMode,
    pub path: PathBuf,
    pub counts: BTreeMap<LinkState, usize>,
    pub units: Vec<UnitState>,
}

impl TargetStatus {
    #[must_use]
    pub fn in_sync(&self) -> bool {
        self.units.iter().all(|u| u.state == LinkState::InSync)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub source: PathBuf,
    pub targets: Vec<TargetStatus>,
    /// Counts summed over every target.
    pub totals: BTreeMap<LinkState, usize>,
}

impl StatusReport {
    #[must_use]
    pub fn divergent(&self) -> usize {
        self.totals
            .iter()
            .filter(|(state, _)| **state != LinkState::InSync)
            .map(|(_, count)| count)
            .sum()
    }
}

#[must_use]
pub fn status(source: &SourceTree, snapshots: &[Snapshot]) -> StatusReport {
    let mut totals: BTreeMap<LinkState, usize> = BTreeMap::new();
    let targets = snapshots
        .iter()
        .map(|snapshot| {
            let counts = snapshot.counts();
            for (state, count) in &counts {
                *totals.entry(*state).or_insert(0) += count;
            }
            TargetStatus {
                target: snapshot.target.name.clone(),
                mode: snapshot.target.mode,
                path: snapshot.target.path.clone(),
                counts,
                units: snapshot
                    .entries
                    .iter()
                    .map(|obs| UnitState {
                        unit: obs.unit.clone(),
                        state: obs.state,
                    })
                    .collect(),
            }
        })
        .collect();
    StatusReport {
        source: source.root.clone(),
        targets,
        totals,
    }
}

/// Path-level detail for one divergent unit.
#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub target: String,
    pub unit: Unit,
    pub state: LinkState,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<PathBuf>,
    pub entry: EntryKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[must_use]
pub fn diff(snapshots: &[Snapshot]) -> DiffReport {
    let entries = snapshots
        .iter()
        .flat_map(|snapshot| {
            snapshot.divergent().map(|obs| DiffEntry {
                target: snapshot.target.name.clone(),
                unit: obs.unit.clone(),
                state: obs.state,
                path: obs.path.clone(),
                expected: obs.expected.clone(),
                actual: obs.actual().cloned(),
                entry: obs.entry.clone(),
            })
        })
        .collect();
    DiffReport { entries }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillListing {
    pub name: String,
    pub path: PathBuf,
    pub metadata: SkillMetadata,
    pub provenance: Provenance,
    /// State of this skill at every target, by target name.
    pub targets: BTreeMap<String, LinkState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListReport {
    pub skills: Vec<SkillListing>,
}

/// Every source skill with its state per target.
///
/// Symlink-mode targets carry one whole-directory state, which applies to
/// every skill.
#[must_use]
pub fn list(source: &SourceTree, snapshots: &[Snapshot]) -> ListReport {
    let skills = source
        .skills()
        .map(|skill| {
            let targets = snapshots
                .iter()
                .filter_map(|snapshot| {
                    let unit = match snapshot.target.mode {
                        SyncMode::Merge => Unit::Skill(skill.name.clone()),
                        SyncMode::Symlink => Unit::Directory,
                    };
                    let state = snapshot
                        .find(&unit)
                        .or_else(|| snapshot.find(&Unit::Directory))
                        .map(|obs| obs.state)?;
                    Some((snapshot.target.name.clone(), state))
                })
                .collect();
            SkillListing {
                name: skill.name.clone(),
                path: skill.path.clone(),
                metadata: skill.metadata.clone(),
                provenance: skill.provenance.clone(),
                targets,
            }
        })
        .collect();
    ListReport { skills }
}
