//! Wires collaborators into worker loops and owns their lifecycle.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use optdesk_core::{
    AppConfig, DecisionEngine, IndicatorSource, MarketScanner, PricingKernel, SharedState,
    StateSummary, WorkerTiming,
};
use optdesk_endpoints::{EndpointRegistry, ProviderHealth};
use optdesk_pricing::BlackScholesKernel;
use optdesk_scheduler::{
    AdaptiveCadence, CadenceController, CadenceDecision, CadenceError, CadenceTable,
    IndicatorCache, IndicatorSettings, IntervalSource, LifecycleError, RetryPolicy, WorkUnit,
    WorkerLoop, WorkerReport,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::scoring::OpportunityScorer;
use crate::units::{
    AlertDispatch, EndpointHealth, Execution, OpportunityDiscovery, PositionReview, RiskMonitor,
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("orchestrator needs a {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid cadence table: {0}")]
    Cadence(#[from] CadenceError),
}

/// Status of every worker, provider and shared collection.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub workers: Vec<WorkerReport>,
    pub providers: Vec<ProviderHealth>,
    pub state: StateSummary,
    pub cadence: Option<CadenceDecision>,
}

// =============================================================================
// Builder
// =============================================================================

pub struct OrchestratorBuilder {
    config: AppConfig,
    registry: Option<Arc<EndpointRegistry>>,
    engine: Option<Arc<dyn DecisionEngine>>,
    scanner: Option<Arc<dyn MarketScanner>>,
    indicator: Option<Arc<dyn IndicatorSource>>,
    kernel: Arc<dyn PricingKernel>,
    state: Arc<SharedState>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: None,
            engine: None,
            scanner: None,
            indicator: None,
            kernel: Arc::new(BlackScholesKernel::new()),
            state: Arc::new(SharedState::new()),
        }
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<EndpointRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn scanner(mut self, scanner: Arc<dyn MarketScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    #[must_use]
    pub fn indicator(mut self, indicator: Arc<dyn IndicatorSource>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// Replaces the default Black-Scholes kernel.
    #[must_use]
    pub fn kernel(mut self, kernel: Arc<dyn PricingKernel>) -> Self {
        self.kernel = kernel;
        self
    }

    /// Shares an existing state store instead of creating a fresh one.
    #[must_use]
    pub fn state(mut self, state: Arc<SharedState>) -> Self {
        self.state = state;
        self
    }

    /// # Errors
    ///
    /// Returns [`BuildError`] if a required collaborator is missing, the
    /// configuration fails validation or the cadence table is malformed.
    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let registry = self.registry.ok_or(BuildError::Missing("endpoint registry"))?;
        let engine = self.engine.ok_or(BuildError::Missing("decision engine"))?;
        let scanner = self.scanner.ok_or(BuildError::Missing("market scanner"))?;
        let indicator = self.indicator.ok_or(BuildError::Missing("indicator source"))?;

        let config = self.config;
        config
            .validate()
            .map_err(|e| BuildError::Config(format!("{e:#}")))?;
        let state = self.state;
        let kernel = self.kernel;
        let rate = config.pricing.risk_free_rate;

        let table = CadenceTable::from_config(&config.cadence)?;
        let cache = IndicatorCache::new(indicator, IndicatorSettings::from(&config.indicator));
        let cadence = Arc::new(AdaptiveCadence::new(cache, CadenceController::new(table)));

        let workers_cfg = &config.workers;
        let discovery_interval = if workers_cfg.adaptive_discovery {
            IntervalSource::Adaptive(Arc::clone(&cadence))
        } else {
            IntervalSource::Fixed(workers_cfg.opportunity_discovery.interval())
        };

        let review = PositionReview::new(
            Arc::clone(&state),
            Arc::clone(&registry),
            Arc::clone(&engine),
            Arc::clone(&kernel),
            config.management.clone(),
            rate,
        );
        let scorer = OpportunityScorer::new(Arc::clone(&kernel), config.discovery.weights, rate)
            .with_min_score(config.discovery.min_score);
        let discovery = OpportunityDiscovery::new(
            Arc::clone(&state),
            scanner,
            Arc::clone(&engine),
            scorer,
            config.discovery.queue_capacity,
            config.discovery.scanner.timeout(),
        );
        let risk = RiskMonitor::new(
            Arc::clone(&state),
            Arc::clone(&registry),
            engine,
            kernel,
            config.risk.clone(),
            rate,
        )
        .with_cadence(Arc::clone(&cadence));
        let execution = Execution::new(Arc::clone(&state), Arc::clone(&registry), config.execution.clone());
        let alerts = AlertDispatch::new(Arc::clone(&state));
        let health = EndpointHealth::new(Arc::clone(&registry));

        let fixed = |timing: WorkerTiming| IntervalSource::Fixed(timing.interval());
        let workers = vec![
            worker(Arc::new(review), fixed(workers_cfg.position_review), workers_cfg.position_review),
            worker(Arc::new(discovery), discovery_interval, workers_cfg.opportunity_discovery),
            worker(Arc::new(risk), fixed(workers_cfg.risk_assessment), workers_cfg.risk_assessment),
            worker(Arc::new(execution), fixed(workers_cfg.execution), workers_cfg.execution),
            worker(Arc::new(alerts), fixed(workers_cfg.alert_dispatch), workers_cfg.alert_dispatch),
            worker(Arc::new(health), fixed(workers_cfg.endpoint_health), workers_cfg.endpoint_health),
        ];

        Ok(Orchestrator {
            state,
            registry,
            cadence,
            workers,
        })
    }
}

fn worker(unit: Arc<dyn WorkUnit>, interval: IntervalSource, timing: WorkerTiming) -> WorkerLoop {
    WorkerLoop::new(unit, interval, RetryPolicy::new(timing.recovery()))
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    state: Arc<SharedState>,
    registry: Arc<EndpointRegistry>,
    cadence: Arc<AdaptiveCadence>,
    workers: Vec<WorkerLoop>,
}

impl Orchestrator {
    #[must_use]
    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    #[must_use]
    pub const fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn cadence(&self) -> &Arc<AdaptiveCadence> {
        &self.cadence
    }

    #[must_use]
    pub fn workers(&self) -> &[WorkerLoop] {
        &self.workers
    }

    #[must_use]
    pub fn worker(&self, name: &str) -> Option<&WorkerLoop> {
        self.workers.iter().find(|w| w.name() == name)
    }

    /// Seeds shared state with the positions the best healthy provider
    /// reports. Failures are logged; position review reconciles later.
    pub async fn load_positions(&self) -> usize {
        let routed = match self
            .registry
            .execute("get_positions", |ep| async move { ep.get_positions().await })
            .await
        {
            Ok(routed) => routed,
            Err(e) => {
                warn!(error = %e, "Initial position load failed");
                return 0;
            }
        };

        let now = Utc::now();
        let count = routed.value.len();
        for position in routed.value {
            self.state.upsert_position(position.into_position(routed.provider.clone(), now));
        }
        info!(provider = %routed.provider, count, "Loaded open positions");
        count
    }

    /// Loads open positions, then starts every worker.
    ///
    /// If a worker refuses to start, the workers already started are stopped
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if any worker refuses to start (already started or
    /// stopped, or no Tokio runtime).
    pub async fn start_all(&self) -> anyhow::Result<()> {
        self.load_positions().await;
        for (index, worker) in self.workers.iter().enumerate() {
            if let Err(e) = worker.start() {
                let started = &self.workers[..index];
                warn!(
                    worker = %worker.name(),
                    error = %e,
                    started = started.len(),
                    "Worker failed to start, rolling back"
                );
                for result in join_all(started.iter().map(WorkerLoop::stop)).await {
                    if let Err(stop_err) = result {
                        warn!(error = %stop_err, "Error stopping worker during rollback");
                    }
                }
                return Err(
                    anyhow::Error::new(e).context(format!("starting worker {}", worker.name()))
                );
            }
        }
        info!(workers = self.workers.len(), "All workers started");
        Ok(())
    }

    /// Stops every worker concurrently, each finishing its in-flight tick.
    ///
    /// # Errors
    ///
    /// Returns the first [`LifecycleError`] after every worker has been
    /// asked to stop.
    pub async fn stop_all(&self) -> Result<(), LifecycleError> {
        let results = join_all(self.workers.iter().map(WorkerLoop::stop)).await;
        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!("All workers stopped");
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            workers: self.workers.iter().map(WorkerLoop::report).collect(),
            providers: self.registry.health_snapshot(),
            state: self.state.summary(),
            cadence: self.cadence.last_decision(),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workers", &self.workers.iter().map(WorkerLoop::name).collect::<Vec<_>>())
            .field("state", &self.state.summary())
            .finish_non_exhaustive()
    }
}
