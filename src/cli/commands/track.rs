//! sks track - Start tracking a git repo of skills

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::ColorSupport;
use crate::cli::commands::CommandStatus;
use crate::cli::commands::update::render_report;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;
use crate::tracked::TrackedRepoManager;

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Git URL (https, ssh or a local path)
    pub url: String,

    /// Repo id used as the skill name prefix (derived from the URL by default)
    #[arg(long)]
    pub name: Option<String>,

    /// Branch to follow (defaults to the remote HEAD)
    #[arg(long)]
    pub branch: Option<String>,
}

pub fn run(ctx: &AppContext, args: &TrackArgs) -> Result<CommandStatus> {
    let _lock = ctx.lock()?;
    let backups = ctx.backups();
    let manager = TrackedRepoManager::new(&ctx.sks_root, &ctx.source_root, &backups);

    let mut config = ctx.config.clone();
    let report = manager.track(
        &mut config,
        &args.url,
        args.name.as_deref(),
        args.branch.as_deref(),
    )?;
    ctx.save_config(&config)?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        let mut layout = HumanLayout::new();
        render_report(&mut layout, &report, ColorSupport::detect());
        layout.blank();
        layout.push_line("Run `sks sync` to link the new skills into your targets.");
        emit_human(layout);
    }
    Ok(CommandStatus::Clean)
}
