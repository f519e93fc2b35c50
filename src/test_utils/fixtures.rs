use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::skill::SourceTree;
use crate::core::target::{SyncMode, Target};
use crate::storage::backup::BackupManager;
use crate::utils::fs::symlink_dir;

/// Test fixture providing an isolated source tree, backup root and targets.
pub struct UnitTestFixture {
    pub temp_dir: TempDir,
    pub data_path: PathBuf,
}

impl Default for UnitTestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitTestFixture {
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_path = temp_dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp dir");
        std::fs::create_dir_all(data_path.join("skills")).expect("Failed to create source root");

        println!("[FIXTURE] Created temp directory: {data_path:?}");

        Self {
            temp_dir,
            data_path,
        }
    }

    #[must_use]
    pub fn skills_root(&self) -> PathBuf {
        self.data_path.join("skills")
    }

    #[must_use]
    pub fn backup_root(&self) -> PathBuf {
        self.data_path.join("backups")
    }

    #[must_use]
    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.backup_root())
    }

    /// Create a test file with content.
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.data_path.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        println!(
            "[FIXTURE] Created file: {:?} ({} bytes)",
            full_path,
            content.len()
        );
        full_path
    }

    /// Create a skill in the source tree.
    pub fn create_skill(&self, name: &str, content: &str) -> PathBuf {
        self.create_file(&format!("skills/{name}/SKILL.md"), content)
    }

    /// A target rooted under the fixture; the directory is not created.
    #[must_use]
    pub fn target(&self, name: &str, mode: SyncMode) -> Target {
        Target {
            name: name.to_string(),
            path: self.data_path.join("targets").join(name),
            mode,
        }
    }

    /// Create a real (non-link) skill directory inside a target.
    pub fn create_local_skill(&self, target: &Target, name: &str, content: &str) -> PathBuf {
        let path = target.path.join(name).join("SKILL.md");
        std::fs::create_dir_all(path.parent().expect("skill dir")).expect("create local skill");
        std::fs::write(&path, content).expect("write local skill");
        path
    }

    /// Create a symlink entry inside a target.
    pub fn link(&self, target: &Target, name: &str, dest: &Path) {
        std::fs::create_dir_all(&target.path).expect("create target dir");
        symlink_dir(dest, &target.path.join(name)).expect("create symlink");
    }

    #[must_use]
    pub fn source(&self) -> SourceTree {
        SourceTree::scan(&self.skills_root(), &BTreeSet::new()).expect("scan source")
    }
}

impl Drop for UnitTestFixture {
    fn drop(&mut self) {
        println!("[FIXTURE] Cleaning up temp directory: {:?}", self.data_path);
    }
}
