//! sks diff - Path-level detail for divergent units

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_state, styled, with_color};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::core::observer::observe_all;
use crate::core::report::{DiffReport, diff};
use crate::error::Result;
use crate::utils::fs::EntryKind;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Only diff this target
    pub target: Option<String>,
}

pub fn run(ctx: &AppContext, args: &DiffArgs) -> Result<CommandStatus> {
    let source = ctx.source()?;
    let registry = ctx.registry();
    let targets = registry.select(args.target.as_deref())?;
    let snapshots = observe_all(&source, targets)?;
    let report = diff(&snapshots);

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        emit_human(render(&report, ColorSupport::detect()));
    }
    Ok(CommandStatus::Clean)
}

fn render(report: &DiffReport, support: ColorSupport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    if report.is_empty() {
        layout.push_line(styled("No differences.", SksStyles::success, support));
        return layout;
    }

    for entry in &report.entries {
        layout.push_line(format!(
            "{}/{} {}",
            entry.target,
            entry.unit,
            format_state(entry.state, support)
        ));
        layout.kv("  path", &entry.path.display().to_string());
        let found = match &entry.entry {
            EntryKind::Absent => "nothing".to_string(),
            EntryKind::Symlink { dest } => format!(
                "link {} {}",
                with_color(SksStyles::arrow(), "→", support),
                dest.display()
            ),
            EntryKind::Dir => "real directory".to_string(),
            EntryKind::File => "file".to_string(),
        };
        layout.kv("  found", &found);
        if let Some(expected) = &entry.expected {
            layout.kv("  expected", &styled(expected.display().to_string(), SksStyles::path, support));
        }
    }
    layout
}
