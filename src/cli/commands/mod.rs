//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function to execute the command

use clap::Subcommand;
use serde::Serialize;

pub mod backup;
pub mod collect;
pub mod completions;
pub mod diff;
pub mod list;
pub mod restore;
pub mod status;
pub mod sync;
pub mod target;
pub mod track;
pub mod uninstall;
pub mod update;

use crate::app::AppContext;
use crate::cli::output::{emit_robot, robot_ok, robot_partial};
use crate::error::Result;

/// Whether a command left anything for the user to resolve.
///
/// `Unresolved` maps to exit code 1 even though no error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Clean,
    Unresolved,
}

impl CommandStatus {
    #[must_use]
    pub const fn from_clean(clean: bool) -> Self {
        if clean { Self::Clean } else { Self::Unresolved }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the link state of every skill at every target
    Status(status::StatusArgs),

    /// Create, repair and prune links so targets match the source
    Sync(sync::SyncArgs),

    /// Path-level detail for everything out of sync
    Diff(diff::DiffArgs),

    /// List source skills with their state per target
    List(list::ListArgs),

    /// Move skills created inside targets into the source
    Collect(collect::CollectArgs),

    /// Manage registered targets
    Target(target::TargetArgs),

    /// Create, list or clean up backups
    Backup(backup::BackupArgs),

    /// Restore a target or the source from a backup
    Restore(restore::RestoreArgs),

    /// Pull tracked repos and refresh their skills
    Update(update::UpdateArgs),

    /// Remove a skill from the source and every target
    Uninstall(uninstall::UninstallArgs),

    /// Clone a git repo and track its skills
    Track(track::TrackArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<CommandStatus> {
    match command {
        Commands::Status(args) => status::run(ctx, args),
        Commands::Sync(args) => sync::run(ctx, args),
        Commands::Diff(args) => diff::run(ctx, args),
        Commands::List(args) => list::run(ctx, args),
        Commands::Collect(args) => collect::run(ctx, args),
        Commands::Target(args) => target::run(ctx, args),
        Commands::Backup(args) => backup::run(ctx, args),
        Commands::Restore(args) => restore::run(ctx, args),
        Commands::Update(args) => update::run(ctx, args),
        Commands::Uninstall(args) => uninstall::run(ctx, args),
        Commands::Track(args) => track::run(ctx, args),
        Commands::Completions(args) => completions::run(args),
    }
}

/// Robot envelope: `ok` when nothing is left over, `partial` otherwise.
pub(crate) fn emit_outcome<T: Serialize>(
    data: &T,
    completed: usize,
    unresolved: usize,
) -> Result<CommandStatus> {
    if unresolved == 0 {
        emit_robot(&robot_ok(data))?;
    } else {
        emit_robot(&robot_partial(data, completed, unresolved))?;
    }
    Ok(CommandStatus::from_clean(unresolved == 0))
}
