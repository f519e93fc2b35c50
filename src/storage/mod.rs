//! Storage layer for sks
//!
//! Backup snapshots and the process lock. Skill content itself lives in the
//! source tree; nothing about sync state is persisted.

pub mod backup;
pub mod lock;

pub use backup::{BackupManager, BackupSnapshot, RetentionPolicy};
pub use lock::SourceLock;
