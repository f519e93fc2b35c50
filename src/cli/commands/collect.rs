//! sks collect - Pull target-local skills into the source

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_status, styled};
use crate::cli::commands::{CommandStatus, emit_outcome};
use crate::cli::output::{HumanLayout, emit_human};
use crate::core::collector::{CollectKind, CollectOptions, CollectReport, Collector, ItemStatus};
use crate::core::observer::observe_all;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Target to collect from
    #[arg(conflicts_with = "all", required_unless_present = "all")]
    pub target: Option<String>,

    /// Collect from every target
    #[arg(long)]
    pub all: bool,

    /// Show what would be collected without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// When a target copy differs from the source copy, the target copy wins
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &CollectArgs) -> Result<CommandStatus> {
    let _lock = if args.dry_run { None } else { Some(ctx.lock()?) };

    let source = ctx.source()?;
    let registry = ctx.registry();
    let targets = registry.select(args.target.as_deref())?;
    let snapshots = observe_all(&source, targets)?;

    let backups = ctx.backups();
    let report = Collector::new(&backups).collect(
        &snapshots,
        CollectOptions {
            dry_run: args.dry_run,
            force: args.force,
        },
    );

    let unresolved = report.conflicts().count() + report.failures().count();
    if ctx.robot_mode {
        return emit_outcome(&report, report.imported().len(), unresolved);
    }
    emit_human(render(&report, ColorSupport::detect()));
    Ok(CommandStatus::from_clean(!report.has_unresolved()))
}

fn render(report: &CollectReport, support: ColorSupport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    if report.items.is_empty() {
        layout.push_line("Nothing to collect.");
        return layout;
    }
    layout.title(if report.dry_run { "Collect (dry run)" } else { "Collect" });

    for item in &report.items {
        let marker = match &item.status {
            ItemStatus::Done => format_status(Some(true), support),
            ItemStatus::Failed { .. } => format_status(Some(false), support),
            ItemStatus::NotApplied | ItemStatus::Conflicted { .. } => format_status(None, support),
            ItemStatus::Planned => styled("·", SksStyles::muted, support),
        };
        let what = match &item.kind {
            CollectKind::Import => "import".to_string(),
            CollectKind::Reconcile => "identical to source, clear local copy".to_string(),
            CollectKind::Overwrite => "overwrite source copy".to_string(),
            CollectKind::Conflict => "differs from source; rerun with --force to take it".to_string(),
            CollectKind::Skip { reason } => format!("skipped: {reason}"),
        };
        let mut line = format!("{marker} {}/{} {what}", item.target, item.skill);
        if let ItemStatus::Failed { error, .. } = &item.status {
            line.push_str(&format!(": {error}"));
        }
        layout.push_line(line);
    }

    let imported = report.imported();
    if !imported.is_empty() {
        layout.blank();
        layout.push_line(styled(
            format!("{} skill(s) collected; run `sks sync` to link them back.", imported.len()),
            SksStyles::success,
            support,
        ));
    }
    layout
}
