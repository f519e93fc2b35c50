//! Isolated sks workspace for end-to-end scenarios.
//!
//! Every fixture gets its own root, config file and target directories under
//! a temp dir, so tests never see the user's real configuration.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process::Output;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub struct E2EFixture {
    pub scenario: String,
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub config_path: PathBuf,
    step: usize,
}

impl E2EFixture {
    pub fn new(scenario: &str) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let root = temp_dir.path().join("sks-root");
        fs::create_dir_all(&root).expect("create root");
        let config_path = root.join("config.toml");
        Self {
            scenario: scenario.to_string(),
            temp_dir,
            root,
            config_path,
            step: 0,
        }
    }

    pub fn log_step(&mut self, step: &str) {
        self.step += 1;
        eprintln!("[{}] step {}: {step}", self.scenario, self.step);
    }

    pub fn skills_root(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn target_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("targets").join(name)
    }

    /// Create `<source>/<name>/SKILL.md`.
    pub fn create_skill(&self, name: &str, body: &str) -> PathBuf {
        let dir = self.skills_root().join(name);
        fs::create_dir_all(&dir).expect("create skill dir");
        fs::write(dir.join("SKILL.md"), body).expect("write SKILL.md");
        dir
    }

    /// Create a real skill directory inside a target.
    pub fn create_local_skill(&self, target: &str, name: &str, body: &str) -> PathBuf {
        let dir = self.target_path(target).join(name);
        fs::create_dir_all(&dir).expect("create local skill dir");
        fs::write(dir.join("SKILL.md"), body).expect("write local SKILL.md");
        dir
    }

    pub fn link(&self, link: &Path, dest: &Path) {
        fs::create_dir_all(link.parent().expect("link parent")).expect("create link parent");
        symlink(dest, link).expect("create symlink");
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("sks").expect("sks binary");
        cmd.env("SKS_ROOT", &self.root)
            .env("SKS_CONFIG", &self.config_path)
            .env("NO_COLOR", "1")
            .env_remove("SKS_SOURCE")
            .env_remove("SKS_BACKUP_DIR")
            .env_remove("SKS_BACKUP_KEEP")
            .env_remove("RUST_LOG")
            .current_dir(self.temp_dir.path());
        cmd
    }

    pub fn run_sks(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("run sks")
    }

    /// Run with `--robot` and parse stdout as JSON.
    pub fn run_robot(&self, args: &[&str]) -> (Output, Value) {
        let mut full = vec!["--robot"];
        full.extend_from_slice(args);
        let output = self.run_sks(&full);
        let json = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
            panic!(
                "[{}] stdout of {args:?} is not JSON ({err}): {}",
                self.scenario,
                String::from_utf8_lossy(&output.stdout)
            )
        });
        (output, json)
    }

    pub fn assert_success(&self, output: &Output, context: &str) {
        assert!(
            output.status.success(),
            "[{}] {context} failed\nstdout: {}\nstderr: {}",
            self.scenario,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn assert_exit(&self, output: &Output, code: i32, context: &str) {
        assert_eq!(
            output.status.code(),
            Some(code),
            "[{}] {context}: unexpected exit\nstdout: {}\nstderr: {}",
            self.scenario,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn add_target(&self, name: &str, mode: &str) -> PathBuf {
        let path = self.target_path(name);
        let output = self.run_sks(&[
            "target",
            "add",
            name,
            path.to_str().expect("utf-8 path"),
            "--mode",
            mode,
        ]);
        self.assert_success(&output, "target add");
        path
    }

    /// `in_sync` count (etc.) from `status --robot` totals.
    pub fn total(&self, status: &Value, state: &str) -> u64 {
        status["data"]["totals"][state].as_u64().unwrap_or(0)
    }
}

pub fn link_dest(path: &Path) -> Option<PathBuf> {
    fs::read_link(path).ok()
}

pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}
