pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "docflow",
    about = "Docflow operator CLI",
    long_about = "Operate the document approval store: migrations, demo data, one-off sweeps, config inspection, and readiness checks.",
    after_help = "Examples:\n  docflow migrate\n  docflow sweep --mode all\n  docflow doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo organisation and document types, then verify them")]
    Seed,
    #[command(about = "Run scheduled sweeps once and report what they changed")]
    Sweep {
        #[arg(long, value_enum, default_value_t = SweepMode::All)]
        mode: SweepMode,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SweepMode {
    AutoApprove,
    DeadlineCheck,
    SkipUnassigned,
    All,
}

/// Sweep and engine events go to stderr so stdout stays a single JSON payload.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Sweep { mode } => commands::sweep::run(mode),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (healthy, output) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
