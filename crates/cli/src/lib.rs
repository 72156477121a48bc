pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dingbridge",
    about = "DingTalk bridge operator CLI",
    long_about = "Inspect dingbridge configuration, check runtime readiness, and send one-shot webhook replies.",
    after_help = "Examples:\n  dingbridge config\n  dingbridge doctor --json\n  dingbridge send --text \"deploy finished\" --at-all"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with secret redaction")]
    Config,
    #[command(about = "Validate config, stream credentials, and webhook target readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send a one-shot message to the configured webhook")]
    Send(commands::send::SendArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Send(args) => commands::send::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
