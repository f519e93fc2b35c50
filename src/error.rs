//! Error types for sks.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SksError {
    #[error("target already registered: {0}")]
    DuplicateTarget(String),

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("tracked repo not found: {0}")]
    RepoNotFound(String),

    /// Refusing to delete content the tool does not own.
    #[error("unsafe removal refused: {0}")]
    UnsafeRemoval(String),

    #[error("target {target} holds content that is not an in-sync link: {detail}")]
    ConflictLocalContent { target: String, detail: String },

    #[error("content conflict for skill {skill} (target {target}): source and target copies differ")]
    ContentConflict { skill: String, target: String },

    /// Fatal for the action it was guarding.
    #[error("backup write failed: {0}")]
    BackupWriteFailed(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("git operation failed: {0}")]
    GitOperationFailed(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("another sks invocation ({holder}) holds the lock at {}", .path.display())]
    Locked { path: PathBuf, holder: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SksError {
    /// Stable machine-readable code used by robot output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateTarget(_) => "duplicate_target",
            Self::InvalidPath { .. } => "invalid_path",
            Self::TargetNotFound(_) => "target_not_found",
            Self::SkillNotFound(_) => "skill_not_found",
            Self::RepoNotFound(_) => "repo_not_found",
            Self::UnsafeRemoval(_) => "unsafe_removal",
            Self::ConflictLocalContent { .. } => "conflict_local_content",
            Self::ContentConflict { .. } => "content_conflict",
            Self::BackupWriteFailed(_) => "backup_write_failed",
            Self::BackupNotFound(_) => "backup_not_found",
            Self::GitOperationFailed(_) => "git_operation_failed",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Locked { .. } => "locked",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

impl From<git2::Error> for SksError {
    fn from(err: git2::Error) -> Self {
        Self::GitOperationFailed(err.message().to_string())
    }
}

impl From<serde_json::Error> for SksError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<walkdir::Error> for SksError {
    fn from(err: walkdir::Error) -> Self {
        let message = err.to_string();
        err.into_io_error()
            .map_or_else(|| Self::Io(std::io::Error::other(message)), Self::Io)
    }
}

pub type Result<T> = std::result::Result<T, SksError>;
