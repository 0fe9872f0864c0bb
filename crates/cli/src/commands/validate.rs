//! Validate CLI command.
//!
//! Loads configuration and wires the full orchestrator without starting any
//! worker, so config mistakes surface before a deployment.

use anyhow::Result;
use clap::Args;
use optdesk_core::AppConfig;
use optdesk_orchestrator::OrchestratorStatus;

use super::cadence::describe;
use super::run::wire;
use super::ConfigArgs;

/// Arguments for the validate command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Builds the orchestrator from `config` and returns its idle status.
///
/// # Errors
/// Returns an error if any collaborator cannot be constructed.
pub fn check(config: AppConfig) -> Result<OrchestratorStatus> {
    let orchestrator = wire(config)?.build()?;
    Ok(orchestrator.status())
}

/// Runs the validate command.
///
/// # Errors
/// Returns an error if configuration cannot be loaded or wired.
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let config = args.config.load()?;
    tracing::info!(
        config = %args.config.config,
        profile = args.config.profile.as_deref().unwrap_or("-"),
        "Configuration loaded"
    );

    let bands = describe(&config.cadence, None)?;
    let status = check(config)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    for band in bands {
        println!("{band}");
    }
    tracing::info!(
        workers = status.workers.len(),
        providers = status.providers.len(),
        "Configuration is valid"
    );
    Ok(())
}
