//! sks completions - Shell completion scripts

use clap::{Args, CommandFactory};
use clap_complete::{Shell, generate};

use crate::cli::Cli;
use crate::cli::commands::CommandStatus;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Needs no context: works before any root or config exists.
pub fn run(args: &CompletionsArgs) -> Result<CommandStatus> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(args.shell, &mut command, name, &mut std::io::stdout());
    Ok(CommandStatus::Clean)
}
