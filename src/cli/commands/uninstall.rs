//! sks uninstall - Remove a skill everywhere

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_status, styled};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::core::uninstall::{UninstallOptions, uninstall};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Skill name as it appears in the source
    pub name: String,

    /// Back up and delete real same-named copies at targets
    #[arg(long)]
    pub force: bool,

    /// Delete the tracked clone once its last skill is gone
    #[arg(long)]
    pub remove_clone: bool,
}

pub fn run(ctx: &AppContext, args: &UninstallArgs) -> Result<CommandStatus> {
    let _lock = ctx.lock()?;
    let source = ctx.source()?;
    let registry = ctx.registry();
    let mut config = ctx.config.clone();

    let report = uninstall(
        &args.name,
        UninstallOptions {
            force: args.force,
            remove_clone: args.remove_clone,
        },
        &mut config,
        &ctx.sks_root,
        &source,
        &registry,
        &ctx.backups(),
    )?;
    if report.repo_id.is_some() {
        ctx.save_config(&config)?;
    }

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
        return Ok(CommandStatus::Clean);
    }

    let support = ColorSupport::detect();
    let mut layout = HumanLayout::new();
    layout.push_line(format!(
        "{} Uninstalled {}",
        format_status(Some(true), support),
        report.skill
    ));
    layout.kv("Unlinked", &report.unlinked.len().to_string());
    if !report.removed_local.is_empty() {
        layout.kv("Deleted copies", &report.removed_local.len().to_string());
    }
    layout.kv("Backups", &report.backup_ids.join(", "));
    for path in &report.left_in_place {
        layout.bullet(&styled(
            format!("left in place: {}", path.display()),
            SksStyles::muted,
            support,
        ));
    }
    if let Some(repo_id) = &report.repo_id {
        if report.clone_removed {
            layout.kv("Clone", &format!("{repo_id} removed"));
        } else if report.clone_removable {
            layout.push_line(styled(
                format!("{repo_id} has no skills left; rerun with --remove-clone to delete its clone"),
                SksStyles::muted,
                support,
            ));
        }
    }
    emit_human(layout);
    Ok(CommandStatus::Clean)
}
