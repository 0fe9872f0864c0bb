//! Run CLI command.
//!
//! Wires collaborators from configuration, starts every worker and blocks
//! until SIGINT or SIGTERM, then stops the workers and logs a final status.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use optdesk_core::AppConfig;
use optdesk_decision::build_engine;
use optdesk_endpoints::build_registry;
use optdesk_market_data::{build_scanner, QuoteIndicatorSource};
use optdesk_orchestrator::{Orchestrator, OrchestratorBuilder};
use tracing::{error, info};

use super::ConfigArgs;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Log a status line every N seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    pub status_secs: u64,
}

/// Constructs every collaborator named in `config`.
///
/// # Errors
/// Returns an error if an endpoint, engine, scanner or indicator source
/// cannot be constructed.
pub fn wire(config: AppConfig) -> Result<OrchestratorBuilder> {
    let registry = build_registry(&config.endpoints).context("building endpoint registry")?;
    let engine = build_engine(&config.decision).context("building decision engine")?;
    let scanner = build_scanner(&config.discovery.scanner, config.pricing.risk_free_rate)
        .context("building market scanner")?;
    let indicator = QuoteIndicatorSource::from_config(&config.indicator).context("building indicator source")?;

    Ok(Orchestrator::builder(config)
        .registry(Arc::new(registry))
        .engine(engine)
        .scanner(scanner)
        .indicator(Arc::new(indicator)))
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl+C")?;
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
    Ok(())
}

fn log_status(orchestrator: &Orchestrator) {
    let status = orchestrator.status();
    let healthy = status.providers.iter().filter(|p| p.healthy).count();
    let failing: Vec<&str> = status
        .workers
        .iter()
        .filter(|w| w.consecutive_failures > 0)
        .map(|w| w.name.as_str())
        .collect();
    info!(
        positions = status.state.positions,
        pending_opportunities = status.state.pending_opportunities,
        pending_alerts = status.state.pending_alerts,
        healthy_providers = healthy,
        providers = status.providers.len(),
        band = status.cadence.as_ref().map_or("-", |c| c.band.as_str()),
        failing = ?failing,
        "Desk status"
    );
}

/// Runs the orchestrator until a shutdown signal arrives.
///
/// # Errors
/// Returns an error if configuration, wiring or startup fails.
pub async fn run_orchestrator(args: RunArgs) -> Result<()> {
    info!(config = %args.config.config, "Starting options desk");
    let config = args.config.load()?;
    let orchestrator = wire(config)?.build()?;

    orchestrator.start_all().await?;

    let status_every = (args.status_secs > 0).then(|| Duration::from_secs(args.status_secs));
    let reporter = status_every.map(|every| {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
    });

    let signal = match reporter {
        Some(mut ticker) => {
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    result = &mut shutdown => break result,
                    _ = ticker.tick() => log_status(&orchestrator),
                }
            }
        }
        None => shutdown_signal().await,
    };

    info!("Stopping all workers...");
    if let Err(e) = orchestrator.stop_all().await {
        error!(error = %e, "Error during worker shutdown");
    }

    let status = orchestrator.status();
    info!(status = %serde_json::to_string(&status)?, "Final status");
    info!("Options desk stopped");
    signal
}
