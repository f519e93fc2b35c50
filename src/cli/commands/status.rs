//! sks status - Link state per target

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_state, styled};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::core::observer::{LinkState, observe_all};
use crate::core::report::{StatusReport, status};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only report this target
    pub target: Option<String>,

    /// Also list units that are in sync
    #[arg(long, short)]
    pub all: bool,
}

/// Read-only: drift is reported, never an error.
pub fn run(ctx: &AppContext, args: &StatusArgs) -> Result<CommandStatus> {
    let source = ctx.source()?;
    let registry = ctx.registry();
    let targets = registry.select(args.target.as_deref())?;
    let snapshots = observe_all(&source, targets)?;
    let report = status(&source, &snapshots);

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        emit_human(render(&report, args.all, ColorSupport::detect()));
    }
    Ok(CommandStatus::Clean)
}

fn render(report: &StatusReport, all: bool, support: ColorSupport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout.title("Skill sync status");
    layout.kv("Source", &styled(report.source.display().to_string(), SksStyles::path, support));
    layout.blank();

    if report.targets.is_empty() {
        layout.push_line("No targets registered. Add one with `sks target add <name>`.");
        return layout;
    }

    for target in &report.targets {
        layout.section(&format!("{} ({})", target.target, target.mode));
        layout.kv("Path", &target.path.display().to_string());
        let summary: Vec<String> = target
            .counts
            .iter()
            .map(|(state, count)| format!("{count} {}", format_state(*state, support)))
            .collect();
        layout.kv(
            "States",
            &if summary.is_empty() {
                "empty".to_string()
            } else {
                summary.join(", ")
            },
        );
        for unit in &target.units {
            if all || unit.state != LinkState::InSync {
                let name = unit.unit.to_string();
                layout.bullet(&format!("{name:<32} {}", format_state(unit.state, support)));
            }
        }
        layout.blank();
    }

    let divergent = report.divergent();
    if divergent == 0 {
        layout.push_line(styled("Everything is in sync.", SksStyles::success, support));
    } else {
        layout.push_line(styled(
            format!("{divergent} unit(s) out of sync; run `sks diff` for detail."),
            SksStyles::warning,
            support,
        ));
    }
    layout
}
