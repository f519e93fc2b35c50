//! sks - Skill Sync CLI
//!
//! Keep one canonical skills directory linked into every agent tool.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sks::Result;
use sks::app::AppContext;
use sks::cli::output::{OutputMode, emit_json, robot_error};
use sks::cli::{Cli, CommandStatus, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(CommandStatus::Clean) => ExitCode::SUCCESS,
        Ok(CommandStatus::Unresolved) => ExitCode::FAILURE,
        Err(e) => {
            // Robot mode: JSON error output to stdout
            if cli.output_mode() == OutputMode::Human || emit_json(&robot_error(&e)).is_err() {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<CommandStatus> {
    if let Commands::Completions(args) = &cli.command {
        return sks::cli::commands::completions::run(args);
    }
    let ctx = AppContext::from_cli(cli)?;
    sks::cli::commands::run(&ctx, &cli.command)
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn,sks=info",
        1 => "info,sks=debug",
        2 => "debug,sks=trace",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.output_mode() == OutputMode::Robot {
        // JSON logging for robot mode
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
