//! sks restore - Copy a snapshot back over a target or the source

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, format_status};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Target name, or `source`. Unregistered targets can be restored too.
    pub target: String,

    /// Snapshot id (defaults to the newest for the target)
    #[arg(long, value_name = "ID")]
    pub from: Option<String>,
}

pub fn run(ctx: &AppContext, args: &RestoreArgs) -> Result<CommandStatus> {
    let _lock = ctx.lock()?;
    let report = ctx.backups().restore(&args.target, args.from.as_deref())?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        let mut layout = HumanLayout::new();
        layout.push_line(format!(
            "{} Restored {} from {}",
            format_status(Some(true), ColorSupport::detect()),
            args.target,
            report.restored_from
        ));
        if let Some(id) = &report.pre_restore_id {
            layout.kv("Previous state", id);
        }
        for path in &report.restored {
            layout.bullet(&path.display().to_string());
        }
        emit_human(layout);
    }
    Ok(CommandStatus::Clean)
}
