use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cli::output::OutputMode;
use crate::config::Config;
use crate::core::skill::SourceTree;
use crate::core::target::TargetRegistry;
use crate::error::{Result, SksError};
use crate::storage::{BackupManager, SourceLock};
use crate::utils::fs::{canonical_or_self, ensure_dir};

pub struct AppContext {
    pub sks_root: PathBuf,
    /// Where registry changes are written back.
    pub config_path: PathBuf,
    pub config: Config,
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    pub robot_mode: bool,
}

impl AppContext {
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let sks_root = Self::find_sks_root()?;
        ensure_dir(&sks_root)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| default_config_path(&sks_root));
        let config = Config::load(cli.config.as_deref(), &sks_root)?;

        let source_root = config.source_root(&sks_root);
        ensure_dir(&source_root)?;
        let source_root = canonical_or_self(&source_root);
        let backup_root = config.backup_root(&sks_root);
        debug!(
            root = %sks_root.display(),
            source = %source_root.display(),
            config = %config_path.display(),
            "resolved sks context"
        );

        Ok(Self {
            sks_root,
            config_path,
            config,
            source_root,
            backup_root,
            robot_mode: cli.output_mode() == OutputMode::Robot,
        })
    }

    fn find_sks_root() -> Result<PathBuf> {
        if let Ok(root) = std::env::var("SKS_ROOT") {
            return Ok(PathBuf::from(root));
        }
        let cwd = std::env::current_dir()?;
        if let Some(found) = find_upwards(&cwd, ".sks") {
            return Ok(found);
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| SksError::ConfigInvalid("data directory not found".to_string()))?;
        Ok(data_dir.join("sks"))
    }

    #[must_use]
    pub fn registry(&self) -> TargetRegistry {
        TargetRegistry::from_config(&self.config)
    }

    pub fn source(&self) -> Result<SourceTree> {
        SourceTree::scan(&self.source_root, &self.tracked_repo_ids())
    }

    #[must_use]
    pub fn tracked_repo_ids(&self) -> BTreeSet<String> {
        self.config
            .tracked
            .iter()
            .map(|t| t.repo_id.clone())
            .collect()
    }

    #[must_use]
    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.backup_root.clone())
    }

    /// Exclusive lock for commands that mutate the source or targets.
    pub fn lock(&self) -> Result<SourceLock> {
        SourceLock::acquire(&self.sks_root)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        config.save(&self.config_path, &self.sks_root)
    }

    /// Persist registry changes.
    pub fn save_registry(&self, registry: &TargetRegistry) -> Result<()> {
        let mut config = self.config.clone();
        registry.write_into(&mut config);
        self.save_config(&config)
    }
}

fn default_config_path(sks_root: &Path) -> PathBuf {
    std::env::var_os("SKS_CONFIG")
        .map_or_else(|| sks_root.join("config.toml"), PathBuf::from)
}

fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(name);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn find_upwards_locates_marker_in_ancestor() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join(".sks");
        std::fs::create_dir_all(&marker).unwrap();
        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_upwards(&nested, ".sks"), Some(marker));
        assert_eq!(find_upwards(&nested, ".nope"), None);
    }
}
