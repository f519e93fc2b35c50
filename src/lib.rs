//! sks - Skill Sync
//!
//! Keeps one canonical directory of skill bundles linked into every
//! tool-specific skills directory, with backups guarding each destructive step
//! and remote-backed skill trees refreshed from git.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod security;
pub mod storage;
pub mod tracked;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

pub use error::{Result, SksError};
