//! sks backup - Create, list and clean up snapshots

use std::path::PathBuf;

use chrono::Utc;
use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_status, styled};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::config::RESERVED_SOURCE_LABEL;
use crate::error::{Result, SksError};
use crate::storage::backup::{BackupSnapshot, RetentionPolicy};
use crate::utils::format::format_age;

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Target name, or `source` for the source tree
    pub target: Option<String>,

    /// List snapshots, newest first
    #[arg(long, conflicts_with = "cleanup")]
    pub list: bool,

    /// Delete snapshots beyond the retention policy
    #[arg(long)]
    pub cleanup: bool,

    /// Snapshots to keep per cleanup (defaults to backup.keep)
    #[arg(long, requires = "cleanup")]
    pub keep: Option<usize>,
}

pub fn run(ctx: &AppContext, args: &BackupArgs) -> Result<CommandStatus> {
    if args.list {
        return list(ctx, args.target.as_deref());
    }
    if args.cleanup {
        return cleanup(ctx, args);
    }
    let label = args.target.as_deref().ok_or_else(|| {
        SksError::ValidationFailed("name a target (or `source`) to back up".to_string())
    })?;
    create(ctx, label)
}

/// Live path captured by a manual snapshot of `label`.
fn live_path(ctx: &AppContext, label: &str) -> Result<PathBuf> {
    if label == RESERVED_SOURCE_LABEL {
        return Ok(ctx.source_root.clone());
    }
    Ok(ctx.registry().get(label)?.path.clone())
}

fn create(ctx: &AppContext, label: &str) -> Result<CommandStatus> {
    let path = live_path(ctx, label)?;
    let _lock = ctx.lock()?;
    let snapshot = ctx.backups().snapshot(label, "manual", &[path])?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&snapshot))?;
    } else {
        println!(
            "{} Backup {} of {label} ({} entries)",
            format_status(Some(true), ColorSupport::detect()),
            snapshot.id,
            snapshot.entries.len()
        );
    }
    Ok(CommandStatus::Clean)
}

fn list(ctx: &AppContext, label: Option<&str>) -> Result<CommandStatus> {
    let snapshots: Vec<BackupSnapshot> = ctx
        .backups()
        .list()?
        .into_iter()
        .filter(|s| label.is_none_or(|l| s.label == l))
        .collect();

    if ctx.robot_mode {
        emit_robot(&robot_ok(&snapshots))?;
        return Ok(CommandStatus::Clean);
    }

    let support = ColorSupport::detect();
    let now = Utc::now();
    let mut layout = HumanLayout::new();
    if snapshots.is_empty() {
        layout.push_line("No backups.");
    }
    for snapshot in &snapshots {
        layout.push_line(format!(
            "{:<20} {:<12} {:<18} {}",
            snapshot.id,
            snapshot.label,
            snapshot.reason,
            styled(format_age(snapshot.created_at, now), SksStyles::muted, support)
        ));
        for entry in &snapshot.entries {
            layout.push_line(format!("    {}", entry.original.display()));
        }
    }
    emit_human(layout);
    Ok(CommandStatus::Clean)
}

fn cleanup(ctx: &AppContext, args: &BackupArgs) -> Result<CommandStatus> {
    let policy = RetentionPolicy {
        keep: args.keep.unwrap_or(ctx.config.backup.keep),
        max_age: ctx.config.backup.max_age,
    };
    let _lock = ctx.lock()?;
    let report = ctx
        .backups()
        .cleanup(policy, args.target.as_deref(), Utc::now())?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        let mut layout = HumanLayout::new();
        layout.kv("Removed", &report.removed.len().to_string());
        layout.kv("Kept", &report.kept.len().to_string());
        for id in &report.removed {
            layout.bullet(id);
        }
        emit_human(layout);
    }
    Ok(CommandStatus::Clean)
}
