use clap::{Parser, Subcommand};

mod commands;

use commands::{CadenceArgs, RunArgs, ValidateArgs};

#[derive(Parser)]
#[command(name = "optdesk")]
#[command(about = "Options desk orchestrator: position review, discovery, risk and execution workers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every worker until SIGINT or SIGTERM
    Run(RunArgs),
    /// Load the configuration and construct every collaborator without starting workers
    Validate(ValidateArgs),
    /// Show the cadence band table, or the band a given indicator value falls into
    Cadence(CadenceArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run(args) => commands::run_orchestrator(args).await?,
        Commands::Validate(args) => commands::run_validate(&args)?,
        Commands::Cadence(args) => commands::run_cadence(&args)?,
    }

    Ok(())
}
