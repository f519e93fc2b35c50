//! Observer: read-only structural snapshot of a target against the source.
//!
//! This is the single observation routine. `status`, `diff`, `list` and the
//! planner all consume its output, so a dry run and a status report taken at
//! the same instant cannot disagree. Nothing here writes to disk, and nothing
//! is cached between invocations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::core::skill::SourceTree;
use crate::core::target::{SyncMode, Target};
use crate::error::Result;
use crate::security::{LinkDestination, classify_link};
use crate::utils::fs::{EntryKind, entry_kind};

/// The thing compared at a target: one skill (merge mode) or the whole
/// directory (symlink mode).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unit {
    Directory,
    Skill(String),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "*"),
            Self::Skill(name) => write!(f, "{name}"),
        }
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Symlink resolving to the canonical source path.
    InSync,
    /// Nothing at the target; the source has it.
    Missing,
    /// A symlink for a source unit that points elsewhere or is broken.
    Drifted,
    /// Real content at the target that the source does not own.
    LocalOnly,
    /// Symlink into the source for a skill the source no longer has.
    OrphanLink,
}

impl LinkState {
    pub const ALL: [Self; 5] = [
        Self::InSync,
        Self::Missing,
        Self::Drifted,
        Self::LocalOnly,
        Self::OrphanLink,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::Missing => "missing",
            Self::Drifted => "drifted",
            Self::LocalOnly => "local_only",
            Self::OrphanLink => "orphan_link",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed (target, unit) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub unit: Unit,
    pub state: LinkState,
    /// Entry location at the target.
    pub path: PathBuf,
    /// Where a correct link would point, when the source has this unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<PathBuf>,
    /// What currently sits at `path`.
    pub entry: EntryKind,
    /// Whether the source holds a unit of the same name.
    pub shadows_source: bool,
}

impl Observation {
    /// Current link destination, if the entry is a symlink.
    #[must_use]
    pub fn actual(&self) -> Option<&PathBuf> {
        match &self.entry {
            EntryKind::Symlink { dest } => Some(dest),
            _ => None,
        }
    }
}

/// Structural state of one target, sorted by unit.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub target: Target,
    pub source_root: PathBuf,
    pub entries: Vec<Observation>,
}

impl Snapshot {
    #[must_use]
    pub fn counts(&self) -> BTreeMap<LinkState, usize> {
        let mut counts = BTreeMap::new();
        for obs in &self.entries {
            *counts.entry(obs.state).or_insert(0) += 1;
        }
        counts
    }

    /// Observations that are not in sync.
    pub fn divergent(&self) -> impl Iterator<Item = &Observation> {
        self.entries.iter().filter(|obs| obs.state != LinkState::InSync)
    }

    #[must_use]
    pub fn find(&self, unit: &Unit) -> Option<&Observation> {
        self.entries.iter().find(|obs| &obs.unit == unit)
    }
}

/// Observe one target. Pure: reads the filesystem, never writes.
pub fn observe(source: &SourceTree, target: &Target) -> Result<Snapshot> {
    let entries = match target.mode {
        SyncMode::Merge => observe_merge(source, target)?,
        SyncMode::Symlink => vec![observe_directory(source, target)?],
    };
    debug!(
        target_name = %target.name,
        mode = %target.mode,
        units = entries.len(),
        "observed target"
    );
    Ok(Snapshot {
        target: target.clone(),
        source_root: source.root.clone(),
        entries,
    })
}

/// Observe several targets, in target-name order.
pub fn observe_all<'a>(
    source: &SourceTree,
    targets: impl IntoIterator<Item = &'a Target>,
) -> Result<Vec<Snapshot>> {
    let mut snapshots = targets
        .into_iter()
        .map(|target| observe(source, target))
        .collect::<Result<Vec<_>>>()?;
    snapshots.sort_by(|a, b| a.target.name.cmp(&b.target.name));
    Ok(snapshots)
}

fn observe_directory(source: &SourceTree, target: &Target) -> Result<Observation> {
    let entry = entry_kind(&target.path)?;
    let state = match &entry {
        EntryKind::Absent => LinkState::Missing,
        EntryKind::Symlink { dest } => {
            if classify_link(&target.path, dest, &source.root) == LinkDestination::Root
                && target.path.exists()
            {
                LinkState::InSync
            } else {
                LinkState::Drifted
            }
        }
        EntryKind::Dir | EntryKind::File => LinkState::LocalOnly,
    };
    Ok(Observation {
        unit: Unit::Directory,
        state,
        path: target.path.clone(),
        expected: Some(source.root.clone()),
        entry,
        shadows_source: true,
    })
}

fn observe_merge(source: &SourceTree, target: &Target) -> Result<Vec<Observation>> {
    let root_entry = entry_kind(&target.path)?;
    match root_entry {
        EntryKind::Absent => {
            return Ok(source
                .names()
                .map(|name| Observation {
                    unit: Unit::Skill(name.to_string()),
                    state: LinkState::Missing,
                    path: target.path.join(name),
                    expected: Some(source.skill_path(name)),
                    entry: EntryKind::Absent,
                    shadows_source: true,
                })
                .collect());
        }
        EntryKind::Symlink { .. } | EntryKind::File => {
            // A merge target must be a real directory; anything else blocks
            // every per-skill link until the user switches mode or clears it.
            return Ok(vec![Observation {
                unit: Unit::Directory,
                state: LinkState::LocalOnly,
                path: target.path.clone(),
                expected: None,
                entry: root_entry,
                shadows_source: false,
            }]);
        }
        EntryKind::Dir => {}
    }

    let mut names: BTreeSet<String> = source.names().map(str::to_string).collect();
    for entry in fs::read_dir(&target.path)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            warn!(
                target_name = %target.name,
                entry = %entry.path().display(),
                "skipping target entry with a non-UTF-8 name"
            );
            continue;
        };
        if !name.starts_with('.') {
            names.insert(name);
        }
    }

    let mut observations = Vec::with_capacity(names.len());
    for name in names {
        let path = target.path.join(&name);
        let in_source = source.contains(&name);
        let entry = entry_kind(&path)?;

        let state = match &entry {
            EntryKind::Absent => LinkState::Missing,
            EntryKind::Symlink { dest } => {
                let destination = classify_link(&path, dest, &source.root);
                match (in_source, destination) {
                    (true, LinkDestination::Child(child)) if child == name && path.exists() => {
                        LinkState::InSync
                    }
                    (true, _) => LinkState::Drifted,
                    (false, LinkDestination::Outside(_)) => LinkState::LocalOnly,
                    (false, _) => LinkState::OrphanLink,
                }
            }
            EntryKind::Dir => LinkState::LocalOnly,
            EntryKind::File if in_source => LinkState::LocalOnly,
            EntryKind::File => continue,
        };

        observations.push(Observation {
            unit: Unit::Skill(name.clone()),
            state,
            path,
            expected: in_source.then(|| source.skill_path(&name)),
            entry,
            shadows_source: in_source,
        });
    }
    Ok(observations)
}
