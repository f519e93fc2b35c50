//! Skills and the source tree that owns them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SksError};
use crate::security::validate_path_component;
use crate::tracked::naming::parse_tracked_name;
use crate::utils::fs::{EntryKind, entry_kind};

/// Marker file an installer leaves inside a skill it fetched.
pub const ORIGIN_MARKER: &str = ".sks-origin";

/// Skill entry document.
pub const SKILL_FILE: &str = "SKILL.md";

/// Where a skill's content comes from. Decides who is ground truth on
/// update and uninstall: the remote for tracked skills, the local copy
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Local,
    Installed { origin: String },
    Tracked { repo_id: String },
}

impl Provenance {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Installed { .. } => "installed".to_string(),
            Self::Tracked { repo_id } => format!("tracked:{repo_id}"),
        }
    }
}

/// Frontmatter fields of `SKILL.md`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SkillMetadata {
    /// Parse YAML frontmatter delimited by `---` lines.
    ///
    /// Missing or malformed frontmatter yields empty metadata.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let Some(yaml) = frontmatter(content) else {
            return Self::default();
        };
        let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(yaml)
        else {
            return Self::default();
        };
        let field = |key: &str| {
            map.get(key).and_then(|value| match value {
                serde_yaml::Value::String(s) => Some(s.trim().to_string()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                serde_yaml::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
        };
        Self {
            name: field("name"),
            version: field("version"),
            description: field("description"),
        }
    }

    pub fn load(skill_dir: &Path) -> Self {
        match fs::read_to_string(skill_dir.join(SKILL_FILE)) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }
}

fn frontmatter(content: &str) -> Option<&str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let end = rest
        .match_indices("\n---")
        .map(|(idx, _)| idx)
        .find(|idx| {
            let after = &rest[idx + 4..];
            after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n")
        })?;
    Some(&rest[..end])
}

/// A named directory under the source root.
#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub name: String,
    pub path: PathBuf,
    pub metadata: SkillMetadata,
    pub provenance: Provenance,
}

/// The canonical source tree: every skill the targets should see.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    skills: BTreeMap<String, Skill>,
}

impl SourceTree {
    /// Scan `root` for skills. `tracked_repos` are the repo ids whose prefix
    /// marks a skill as tracked.
    pub fn scan(root: &Path, tracked_repos: &BTreeSet<String>) -> Result<Self> {
        if !root.is_dir() {
            return Err(SksError::InvalidPath {
                path: root.to_path_buf(),
                reason: "source root is not a directory".to_string(),
            });
        }

        let mut skills = BTreeMap::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(entry = %entry.path().display(), "skipping source entry with a non-UTF-8 name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            match entry_kind(&path)? {
                EntryKind::Dir => {}
                EntryKind::Symlink { .. } if path.is_dir() => {
                    debug!(skill = %name, "source skill is a symlink");
                }
                _ => continue,
            }
            if let Err(err) = validate_path_component(&name) {
                warn!(skill = %name, error = %err, "skipping source entry with invalid name");
                continue;
            }

            let provenance = provenance_for(&name, &path, tracked_repos);
            let metadata = SkillMetadata::load(&path);
            skills.insert(
                name.clone(),
                Skill {
                    name,
                    path,
                    metadata,
                    provenance,
                },
            );
        }

        debug!(root = %root.display(), count = skills.len(), "scanned source tree");
        Ok(Self {
            root: root.to_path_buf(),
            skills,
        })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Skills in name order.
    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Canonical location of a skill, whether or not it exists yet.
    #[must_use]
    pub fn skill_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn provenance_for(name: &str, path: &Path, tracked_repos: &BTreeSet<String>) -> Provenance {
    if let Some(parsed) = parse_tracked_name(name) {
        if tracked_repos.contains(parsed.repo_id) {
            return Provenance::Tracked {
                repo_id: parsed.repo_id.to_string(),
            };
        }
    }
    if let Ok(raw) = fs::read_to_string(path.join(ORIGIN_MARKER)) {
        let origin = raw.lines().next().unwrap_or_default().trim().to_string();
        if !origin.is_empty() {
            return Provenance::Installed { origin };
        }
    }
    Provenance::Local
}
