//! sks sync - Reconcile targets with the source

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_status, styled};
use crate::cli::commands::{CommandStatus, emit_outcome};
use crate::cli::output::{HumanLayout, emit_human};
use crate::core::applier::{ApplyReport, ApplyStatus, Applier, Outcome};
use crate::core::observer::observe_all;
use crate::core::planner::{ActionKind, PlanOptions, plan_all};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only sync this target
    pub target: Option<String>,

    /// Show the plan without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Back up and replace target-local content that shadows a source skill
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &SyncArgs) -> Result<CommandStatus> {
    let _lock = if args.dry_run { None } else { Some(ctx.lock()?) };

    let source = ctx.source()?;
    let registry = ctx.registry();
    let targets = registry.select(args.target.as_deref())?;
    let snapshots = observe_all(&source, targets)?;
    let plan = plan_all(&snapshots, PlanOptions { force: args.force });

    let backups = ctx.backups();
    let report = Applier::new(&backups).apply(&plan, args.dry_run);
    let unresolved = report.failures().count() + report.rejected().count();

    if ctx.robot_mode {
        return emit_outcome(&report, report.applied(), unresolved);
    }
    emit_human(render(&report, ColorSupport::detect()));
    Ok(CommandStatus::from_clean(report.is_clean()))
}

fn render(report: &ApplyReport, support: ColorSupport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    if report.results.is_empty() {
        layout.push_line(styled("Already in sync.", SksStyles::success, support));
        return layout;
    }
    layout.title(if report.dry_run { "Sync plan (dry run)" } else { "Sync" });

    for result in &report.results {
        let action = &result.action;
        let marker = match &result.outcome {
            Outcome::Applied { .. } => format_status(Some(true), support),
            Outcome::Planned => styled("·", SksStyles::muted, support),
            Outcome::Rejected => format_status(None, support),
            Outcome::Failed { .. } | Outcome::Aborted { .. } => format_status(Some(false), support),
        };
        let mut line = format!(
            "{marker} {}/{} {}",
            action.target,
            action.unit,
            styled(action.kind.label(), SksStyles::muted, support)
        );
        match (&action.kind, &result.outcome) {
            (ActionKind::RejectConflict { reason }, _) => line.push_str(&format!(": {reason}")),
            (_, Outcome::Failed { error, .. } | Outcome::Aborted { error }) => {
                line.push_str(&format!(": {error}"));
            }
            (_, Outcome::Applied { backup_id: Some(id) }) => {
                line.push_str(&format!(" (backup {id})"));
            }
            _ => {}
        }
        layout.push_line(line);
    }

    layout.blank();
    let summary = match report.status {
        ApplyStatus::Success if report.dry_run => styled(
            format!("{} action(s) planned.", report.results.len()),
            SksStyles::success,
            support,
        ),
        ApplyStatus::Success => styled(
            format!("{} action(s) applied.", report.applied()),
            SksStyles::success,
            support,
        ),
        ApplyStatus::Conflicts => styled(
            format!(
                "{} conflict(s) left untouched; use `sks collect` or `--force`.",
                report.rejected().count()
            ),
            SksStyles::warning,
            support,
        ),
        ApplyStatus::PartialFailure => styled(
            format!("{} action(s) failed.", report.failures().count()),
            SksStyles::error,
            support,
        ),
    };
    layout.push_line(summary);
    layout
}
