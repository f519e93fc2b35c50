//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub mod colors;
pub mod commands;
pub mod output;

pub use commands::{CommandStatus, Commands};

use output::OutputMode;

/// Keep one canonical skills directory linked into every agent tool.
#[derive(Parser, Debug)]
#[command(name = "sks", version, about, propagate_version = true)]
pub struct Cli {
    /// Machine-readable JSON output on stdout
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this config file instead of the global and project layers
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        if self.robot {
            OutputMode::Robot
        } else {
            OutputMode::Human
        }
    }
}
