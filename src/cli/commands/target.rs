//! sks target - Manage registered targets

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_status, styled};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::core::target::{RemovalReport, SyncMode, Target, default_path_for};
use crate::error::{Result, SksError};
use crate::utils::fs::expand_tilde;

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[command(subcommand)]
    pub command: TargetCommand,
}

#[derive(Subcommand, Debug)]
pub enum TargetCommand {
    /// List registered targets
    List,

    /// Register a target directory
    Add {
        /// Target name (claude, codex, cursor, gemini and opencode have default paths)
        name: String,

        /// Skills directory of the tool
        path: Option<PathBuf>,

        /// merge: one link per skill; symlink: the directory itself links to the source
        #[arg(long, default_value = "merge")]
        mode: SyncMode,
    },

    /// Unregister a target, removing only links into the source
    Remove {
        name: String,

        /// Back up and delete real content at the target
        #[arg(long)]
        force: bool,
    },

    /// Switch a target between merge and symlink mode
    SetMode { name: String, mode: SyncMode },
}

#[derive(Serialize)]
struct ModeChange<'a> {
    target: &'a str,
    mode: SyncMode,
}

pub fn run(ctx: &AppContext, args: &TargetArgs) -> Result<CommandStatus> {
    match &args.command {
        TargetCommand::List => list(ctx),
        TargetCommand::Add { name, path, mode } => add(ctx, name, path.as_ref(), *mode),
        TargetCommand::Remove { name, force } => remove(ctx, name, *force),
        TargetCommand::SetMode { name, mode } => set_mode(ctx, name, *mode),
    }
}

fn list(ctx: &AppContext) -> Result<CommandStatus> {
    let registry = ctx.registry();
    let targets: Vec<&Target> = registry.list().collect();
    if ctx.robot_mode {
        emit_robot(&robot_ok(&targets))?;
        return Ok(CommandStatus::Clean);
    }

    let support = ColorSupport::detect();
    let mut layout = HumanLayout::new();
    if targets.is_empty() {
        layout.push_line("No targets registered.");
    }
    for target in targets {
        layout.push_line(format!(
            "{:<12} {:<8} {}",
            target.name,
            target.mode.to_string(),
            styled(target.path.display().to_string(), SksStyles::path, support)
        ));
    }
    emit_human(layout);
    Ok(CommandStatus::Clean)
}

fn add(ctx: &AppContext, name: &str, path: Option<&PathBuf>, mode: SyncMode) -> Result<CommandStatus> {
    let path = match path {
        Some(path) => expand_tilde(&path.to_string_lossy()),
        None => default_path_for(name).ok_or_else(|| {
            SksError::ValidationFailed(format!("no default path known for {name}; pass one"))
        })?,
    };

    let _lock = ctx.lock()?;
    let mut registry = ctx.registry();
    let target = registry.add(name, &path, mode, &ctx.source_root)?.clone();
    ctx.save_registry(&registry)?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&target))?;
    } else {
        println!(
            "{} Registered {} ({}) at {}",
            format_status(Some(true), ColorSupport::detect()),
            target.name,
            target.mode,
            target.path.display()
        );
    }
    Ok(CommandStatus::Clean)
}

fn remove(ctx: &AppContext, name: &str, force: bool) -> Result<CommandStatus> {
    let _lock = ctx.lock()?;
    let source = ctx.source()?;
    let mut registry = ctx.registry();
    let report = registry.remove(name, force, &source, &ctx.backups())?;
    ctx.save_registry(&registry)?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        emit_human(render_removal(&report, ColorSupport::detect()));
    }
    Ok(CommandStatus::Clean)
}

fn render_removal(report: &RemovalReport, support: ColorSupport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout.push_line(format!(
        "{} Removed target {}",
        format_status(Some(true), support),
        report.target
    ));
    layout.kv("Unlinked", &report.unlinked.len().to_string());
    if !report.removed_local.is_empty() {
        layout.kv("Deleted", &report.removed_local.len().to_string());
    }
    if let Some(id) = &report.backup_id {
        layout.kv("Backup", id);
    }
    for path in &report.left_in_place {
        layout.bullet(&styled(
            format!("left in place: {}", path.display()),
            SksStyles::muted,
            support,
        ));
    }
    layout
}

fn set_mode(ctx: &AppContext, name: &str, mode: SyncMode) -> Result<CommandStatus> {
    let _lock = ctx.lock()?;
    let source = ctx.source()?;
    let mut registry = ctx.registry();
    registry.set_mode(name, mode, &source)?;
    ctx.save_registry(&registry)?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&ModeChange { target: name, mode }))?;
    } else {
        println!(
            "{} {name} is now in {mode} mode; run `sks sync` to relink",
            format_status(Some(true), ColorSupport::detect())
        );
    }
    Ok(CommandStatus::Clean)
}
