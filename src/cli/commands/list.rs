//! sks list - Source skills and where they are linked

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_state, styled};
use crate::cli::commands::CommandStatus;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::core::observer::observe_all;
use crate::core::report::{ListReport, list};
use crate::error::Result;
use crate::utils::format::truncate_string;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show skills from this tracked repo
    #[arg(long)]
    pub repo: Option<String>,
}

pub fn run(ctx: &AppContext, args: &ListArgs) -> Result<CommandStatus> {
    let source = ctx.source()?;
    let registry = ctx.registry();
    let snapshots = observe_all(&source, registry.list())?;
    let mut report = list(&source, &snapshots);
    if let Some(repo) = &args.repo {
        report
            .skills
            .retain(|skill| skill.provenance.label() == format!("tracked:{repo}"));
    }

    if ctx.robot_mode {
        emit_robot(&robot_ok(&report))?;
    } else {
        emit_human(render(&report, ColorSupport::detect()));
    }
    Ok(CommandStatus::Clean)
}

fn render(report: &ListReport, support: ColorSupport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    if report.skills.is_empty() {
        layout.push_line("No skills in the source tree.");
        return layout;
    }

    layout.title(&format!("{} skill(s)", report.skills.len()));
    for skill in &report.skills {
        let mut header = format!(
            "{} {}",
            styled(&skill.name, SksStyles::success, support),
            styled(format!("[{}]", skill.provenance.label()), SksStyles::muted, support)
        );
        if let Some(version) = &skill.metadata.version {
            header.push_str(&format!(" v{version}"));
        }
        layout.push_line(header);
        if let Some(description) = &skill.metadata.description {
            layout.push_line(format!("    {}", truncate_string(description, 72)));
        }
        for (target, state) in &skill.targets {
            layout.push_line(format!("    {target}: {}", format_state(*state, support)));
        }
    }
    layout
}
