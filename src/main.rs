use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fxalert::cli::setup;
use fxalert::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Recompute dynamic thresholds from historical rates
    Update {
        /// Lower percentile; the upper bound uses 100 minus this value
        #[arg(short, long)]
        percentile: Option<u32>,
        /// Days of history to use
        #[arg(short, long)]
        lookback_days: Option<u32>,
    },
    /// Show stored thresholds and whether they need an update
    Status,
    /// Check live rates once and exit
    Check,
    /// Check live rates periodically until interrupted
    Monitor,
}

impl From<Commands> for fxalert::AppCommand {
    fn from(cmd: Commands) -> fxalert::AppCommand {
        match cmd {
            Commands::Update {
                percentile,
                lookback_days,
            } => fxalert::AppCommand::Update {
                percentile,
                lookback_days,
            },
            Commands::Status => fxalert::AppCommand::Status,
            Commands::Check => fxalert::AppCommand::Check,
            Commands::Monitor => fxalert::AppCommand::Monitor,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => setup::setup_at_path(path),
            None => setup::setup(),
        },
        Some(cmd) => fxalert::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
