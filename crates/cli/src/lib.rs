pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "carelane",
    about = "Carelane clinical workflow agent CLI",
    long_about = "Run guarded operational requests (scheduling, eligibility) through the \
                  planning agent, and operate the supporting store: migrations, demo seed \
                  data, and readiness checks.",
    after_help = "Examples:\n  carelane run \"Book a cardiology appointment for Ravi Kumar next week\"\n  carelane run --dry-run \"Is Ravi Kumar's insurance active today?\"\n  carelane schemas\n  carelane doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Execute one natural-language operational request end to end")]
    Run {
        #[arg(help = "Natural language request (operational tasks only)")]
        request: String,
        #[arg(long, help = "Plan and simulate actions without persisting bookings")]
        dry_run: bool,
    },
    #[command(about = "Print the JSON Schemas of the callable tools")]
    Schemas,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo clinic dataset (idempotent)")]
    Seed,
    #[command(about = "Validate config, Gemini credentials, the audit sink, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { request, dry_run } => commands::run::run(&request, dry_run),
        Command::Schemas => {
            commands::CommandResult { exit_code: 0, output: commands::schemas::run() }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
