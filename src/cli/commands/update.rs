//! sks update - Refresh tracked repos

use clap::Args;

use crate::app::AppContext;
use crate::cli::colors::{ColorSupport, SksStyles, format_status, styled};
use crate::cli::commands::{CommandStatus, emit_outcome};
use crate::cli::output::{HumanLayout, emit_human};
use crate::error::Result;
use crate::tracked::{RepoUpdate, SkillChange, TrackedRepoManager, UpdateReport};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Repo id, or the name of any skill it provides
    #[arg(conflicts_with = "all", required_unless_present = "all")]
    pub name: Option<String>,

    /// Update every tracked repo
    #[arg(long)]
    pub all: bool,

    /// Discard clone-local edits and overwrite locally modified skills
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &UpdateArgs) -> Result<CommandStatus> {
    let _lock = ctx.lock()?;
    let backups = ctx.backups();
    let manager = TrackedRepoManager::new(&ctx.sks_root, &ctx.source_root, &backups);

    let results = match &args.name {
        Some(name) => {
            let entry = TrackedRepoManager::resolve(&ctx.config, name)?;
            vec![RepoUpdate::Updated(manager.update(entry, args.force)?)]
        }
        None => manager.update_all(&ctx.config, args.force),
    };

    let unresolved = results
        .iter()
        .filter(|r| match r {
            RepoUpdate::Updated(report) => report.has_unresolved(),
            RepoUpdate::Failed { .. } => true,
        })
        .count();
    if ctx.robot_mode {
        return emit_outcome(&results, results.len() - unresolved, unresolved);
    }

    let support = ColorSupport::detect();
    let mut layout = HumanLayout::new();
    if results.is_empty() {
        layout.push_line("No tracked repos.");
    }
    for result in &results {
        match result {
            RepoUpdate::Updated(report) => render_report(&mut layout, report, support),
            RepoUpdate::Failed { repo_id, error, .. } => {
                layout.push_line(format!(
                    "{} {repo_id}: {}",
                    format_status(Some(false), support),
                    styled(error, SksStyles::error, support)
                ));
            }
        }
    }
    emit_human(layout);
    Ok(CommandStatus::from_clean(unresolved == 0))
}

pub(crate) fn render_report(layout: &mut HumanLayout, report: &UpdateReport, support: ColorSupport) {
    let short = |oid: &str| oid.chars().take(8).collect::<String>();
    let moved = match &report.previous_head {
        Some(prev) if *prev != report.head => format!("{} → {}", short(prev), short(&report.head)),
        _ => short(&report.head),
    };
    layout.push_line(format!(
        "{} {} ({}) {moved}",
        format_status(Some(!report.has_unresolved()), support),
        report.repo_id,
        report.branch
    ));
    for skill in &report.skills {
        let line = match skill.change {
            SkillChange::Unchanged => continue,
            SkillChange::Added => styled(format!("+ {}", skill.name), SksStyles::success, support),
            SkillChange::Updated => format!("~ {}", skill.name),
            SkillChange::Overwritten => {
                styled(format!("~ {} (local edits replaced)", skill.name), SksStyles::warning, support)
            }
            SkillChange::Removed => styled(format!("- {}", skill.name), SksStyles::warning, support),
            SkillChange::LocallyModified => styled(
                format!("! {} edited locally; kept (use --force to replace)", skill.name),
                SksStyles::error,
                support,
            ),
            SkillChange::Excluded => styled(format!("  {} (excluded)", skill.name), SksStyles::muted, support),
        };
        layout.push_line(format!("    {line}"));
    }
    if let Some(id) = &report.backup_id {
        layout.kv("    Backup", id);
    }
}
