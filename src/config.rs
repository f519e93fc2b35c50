use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::target::{SyncMode, ensure_disjoint_from_source};
use crate::error::{Result, SksError};
use crate::security::validate_path_component;
use crate::tracked::naming::validate_repo_id;
use crate::utils::fs::expand_tilde;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
    #[serde(default)]
    pub tracked: Vec<TrackedRepoEntry>,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>, sks_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("SKS_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(sks_root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate(sks_root)?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("sks/config.toml"))
    }

    fn load_project(sks_root: &Path) -> Result<Option<ConfigPatch>> {
        Self::load_patch(&sks_root.join("config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path).map_err(|err| {
            SksError::ConfigInvalid(format!("read config {}: {err}", path.display()))
        })?;
        let patch = toml::from_str(&raw).map_err(|err| {
            SksError::ConfigInvalid(format!("parse config {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded config layer");
        Ok(Some(patch))
    }

    /// Write the configuration atomically (temp file + rename).
    pub fn save(&self, path: &Path, sks_root: &Path) -> Result<()> {
        self.validate(sks_root)?;
        let raw = toml::to_string_pretty(self)
            .map_err(|err| SksError::Serialization(format!("serialize config: {err}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.source {
            self.source.merge(patch);
        }
        if let Some(patch) = patch.backup {
            self.backup.merge(patch);
        }
        if let Some(entries) = patch.targets {
            for entry in entries {
                match self.targets.iter_mut().find(|t| t.name == entry.name) {
                    Some(existing) => *existing = entry,
                    None => self.targets.push(entry),
                }
            }
        }
        if let Some(entries) = patch.tracked {
            for entry in entries {
                match self.tracked.iter_mut().find(|t| t.repo_id == entry.repo_id) {
                    Some(existing) => *existing = entry,
                    None => self.tracked.push(entry),
                }
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_string("SKS_SOURCE") {
            self.source.path = Some(value);
        }
        if let Some(value) = env_string("SKS_BACKUP_DIR") {
            self.backup.path = Some(value);
        }
        if let Some(value) = env_usize("SKS_BACKUP_KEEP")? {
            self.backup.keep = value;
        }
        Ok(())
    }

    /// Reject malformed target and tracked-repo entries, and targets that
    /// overlap the source tree.
    pub fn validate(&self, sks_root: &Path) -> Result<()> {
        let source_root = self.source_root(sks_root);
        let mut names = HashSet::new();
        for target in &self.targets {
            validate_path_component(&target.name).map_err(|err| {
                SksError::ConfigInvalid(format!("target name {:?}: {err}", target.name))
            })?;
            if target.name == RESERVED_SOURCE_LABEL {
                return Err(SksError::ConfigInvalid(format!(
                    "target name {RESERVED_SOURCE_LABEL:?} is reserved"
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(SksError::ConfigInvalid(format!(
                    "duplicate target name {:?}",
                    target.name
                )));
            }
            if !target.resolved_path().is_absolute() {
                return Err(SksError::ConfigInvalid(format!(
                    "target {} path {:?} is not absolute",
                    target.name, target.path
                )));
            }
            ensure_disjoint_from_source(&target.resolved_path(), target.mode, &source_root)?;
        }

        let mut repos = HashSet::new();
        for repo in &self.tracked {
            validate_repo_id(&repo.repo_id).map_err(|err| {
                SksError::ConfigInvalid(format!("tracked repo id {:?}: {err}", repo.repo_id))
            })?;
            if !repos.insert(repo.repo_id.as_str()) {
                return Err(SksError::ConfigInvalid(format!(
                    "duplicate tracked repo {:?}",
                    repo.repo_id
                )));
            }
            if repo.url.trim().is_empty() {
                return Err(SksError::ConfigInvalid(format!(
                    "tracked repo {} has an empty url",
                    repo.repo_id
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn source_root(&self, sks_root: &Path) -> PathBuf {
        self.source
            .path
            .as_deref()
            .map_or_else(|| sks_root.join("skills"), expand_tilde)
    }

    #[must_use]
    pub fn backup_root(&self, sks_root: &Path) -> PathBuf {
        self.backup
            .path
            .as_deref()
            .map_or_else(|| sks_root.join("backups"), expand_tilde)
    }
}

/// Backup label used for snapshots of the source tree itself.
pub const RESERVED_SOURCE_LABEL: &str = "source";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl SourceConfig {
    fn merge(&mut self, patch: SourcePatch) {
        if let Some(value) = patch.path {
            self.path = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_keep")]
    pub keep: usize,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_age: Option<Duration>,
}

const fn default_keep() -> usize {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: None,
            keep: default_keep(),
            max_age: None,
        }
    }
}

impl BackupConfig {
    fn merge(&mut self, patch: BackupPatch) {
        if let Some(value) = patch.path {
            self.path = Some(value);
        }
        if let Some(value) = patch.keep {
            self.keep = value;
        }
        if let Some(value) = patch.max_age {
            self.max_age = Some(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub mode: SyncMode,
}

impl TargetEntry {
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRepoEntry {
    pub repo_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

impl TrackedRepoEntry {
    #[must_use]
    pub fn resolved_clone_path(&self, sks_root: &Path) -> PathBuf {
        self.clone_path.as_deref().map_or_else(
            || sks_root.join("repos").join(&self.repo_id),
            expand_tilde,
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub source: Option<SourcePatch>,
    pub backup: Option<BackupPatch>,
    pub targets: Option<Vec<TargetEntry>>,
    pub tracked: Option<Vec<TrackedRepoEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SourcePatch {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BackupPatch {
    pub path: Option<String>,
    pub keep: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<usize>().map(Some).map_err(|err| {
            SksError::ConfigInvalid(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}
