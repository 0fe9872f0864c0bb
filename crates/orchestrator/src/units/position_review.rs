//! Position review: reconcile with brokers, apply close rules, then ask the
//! decision engine about whatever is left.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use optdesk_core::{
    ActionKind, BrokerPosition, Decision, DecisionEngine, DecisionRequest, ExternalError,
    ManagementConfig, MarketSnapshot, OrderRequest, Position, PositionBrief, PositionId,
    PricingKernel, ProviderId, SharedState,
};
use optdesk_endpoints::EndpointRegistry;
use optdesk_scheduler::{TickOutcome, WorkUnit};
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};

use crate::rules::{check_close_rules, CloseReason};

pub struct PositionReview {
    state: Arc<SharedState>,
    registry: Arc<EndpointRegistry>,
    engine: Arc<dyn DecisionEngine>,
    kernel: Arc<dyn PricingKernel>,
    config: ManagementConfig,
    risk_free_rate: f64,
}

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub refreshed: usize,
    pub adopted: usize,
    pub removed: usize,
    pub synced_providers: usize,
    pub failed_providers: usize,
}

impl PositionReview {
    #[must_use]
    pub fn new(
        state: Arc<SharedState>,
        registry: Arc<EndpointRegistry>,
        engine: Arc<dyn DecisionEngine>,
        kernel: Arc<dyn PricingKernel>,
        config: ManagementConfig,
        risk_free_rate: f64,
    ) -> Self {
        Self {
            state,
            registry,
            engine,
            kernel,
            config,
            risk_free_rate,
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Refreshes marks from each provider that owns a position (and the
    /// primary), adopts positions only the broker knows about and drops
    /// positions the broker no longer reports.
    ///
    /// # Errors
    ///
    /// Fails if no provider could be read and at least one failed with an
    /// error other than [`ExternalError::NoHealthyProvider`].
    pub async fn reconcile(&self) -> anyhow::Result<Reconciliation> {
        // Snapshot before asking the brokers so a position opened meanwhile
        // is never mistaken for one closed externally.
        let before = self.state.snapshot_positions();
        let mut by_provider: BTreeMap<ProviderId, BTreeSet<PositionId>> = BTreeMap::new();
        by_provider.entry(self.registry.primary()).or_default();
        for position in &before {
            by_provider
                .entry(position.provider.clone())
                .or_default()
                .insert(position.id.clone());
        }

        let now = Utc::now();
        let mut outcome = Reconciliation::default();
        let mut last_error = None;
        for (provider, known) in by_provider {
            let fetched = self
                .registry
                .execute_on(&provider, "get_positions", |ep| async move {
                    ep.get_positions().await
                })
                .await;
            let reported = match fetched {
                Ok(reported) => reported,
                Err(ExternalError::NoHealthyProvider) => {
                    debug!(provider = %provider, "Provider unhealthy, marks left stale");
                    outcome.failed_providers += 1;
                    continue;
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "Position refresh failed");
                    outcome.failed_providers += 1;
                    last_error = Some(e);
                    continue;
                }
            };
            outcome.synced_providers += 1;
            self.apply_report(&provider, &known, reported, now, &mut outcome);
        }

        if outcome.synced_providers == 0 {
            if let Some(e) = last_error {
                return Err(anyhow!(e).context("position refresh failed on every provider"));
            }
        }
        Ok(outcome)
    }

    fn apply_report(
        &self,
        provider: &ProviderId,
        known: &BTreeSet<PositionId>,
        reported: Vec<BrokerPosition>,
        now: DateTime<Utc>,
        outcome: &mut Reconciliation,
    ) {
        let reported: HashMap<PositionId, BrokerPosition> = reported
            .into_iter()
            .map(|p| (p.position_id.clone(), p))
            .collect();

        for id in known {
            match reported.get(id) {
                Some(bp) => {
                    if self.state.update_valuation(id, bp.valuation(now)) {
                        outcome.refreshed += 1;
                    }
                }
                None => {
                    if self.state.remove_position(id).is_some() {
                        info!(provider = %provider, position_id = %id, "Position closed at broker, removed");
                        outcome.removed += 1;
                    }
                }
            }
        }

        for (id, bp) in reported {
            if known.contains(&id) {
                continue;
            }
            info!(provider = %provider, position_id = %id, symbol = %bp.symbol, "Adopted broker position");
            self.state.upsert_position(bp.into_position(provider.clone(), now));
            outcome.adopted += 1;
        }
    }

    // ========================================================================
    // Closing
    // ========================================================================

    /// Submits a closing order at the current mark; removes the position on fill.
    async fn close(&self, position: &Position, reason: CloseReason) -> bool {
        let Some(mark) = position.valuation.as_ref().map(|v| v.mark) else {
            return false;
        };
        let order = OrderRequest::closing(position, mark);
        let result = self
            .registry
            .execute_on(&position.provider, "submit_order", |ep| async move {
                ep.submit_order(order).await
            })
            .await;

        match result {
            Ok(fill) if fill.is_filled() => {
                self.state.remove_position(&position.id);
                info!(
                    position_id = %position.id,
                    symbol = %position.symbol,
                    reason = %reason,
                    order_id = %fill.order_id,
                    price = ?fill.fill_price,
                    "Position closed"
                );
                true
            }
            Ok(fill) => {
                warn!(
                    position_id = %position.id,
                    reason = %reason,
                    status = ?fill.status,
                    message = fill.message.as_deref().unwrap_or(""),
                    "Close order not filled"
                );
                false
            }
            Err(e) => {
                warn!(position_id = %position.id, reason = %reason, error = %e, "Close order failed");
                false
            }
        }
    }

    // ========================================================================
    // Engine review
    // ========================================================================

    fn brief(&self, position: &Position, now: DateTime<Utc>) -> Option<PositionBrief> {
        let valuation = position.valuation.as_ref()?;
        let market = MarketSnapshot::from_valuation(valuation, self.risk_free_rate);
        let metrics = self.kernel.compute_metrics(position, &market);
        Some(PositionBrief {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            strategy: position.strategy,
            quantity: position.quantity,
            days_to_expiry: position.days_to_expiry(now.date_naive()),
            unrealized_pnl: position
                .unrealized_pnl()
                .and_then(|p| p.to_f64())
                .unwrap_or(0.0),
            max_profit: metrics.max_profit,
            max_loss: metrics.max_loss,
            probability_of_profit: metrics.probability_of_profit,
            delta: metrics.greeks.delta,
            theta: metrics.greeks.theta,
        })
    }

    async fn engine_review(&self, candidates: Vec<Position>, now: DateTime<Utc>) -> usize {
        let briefs: Vec<PositionBrief> = candidates.iter().filter_map(|p| self.brief(p, now)).collect();
        if briefs.is_empty() {
            return 0;
        }

        let count = briefs.len();
        let decision = self
            .engine
            .decide(DecisionRequest::ManagePositions { positions: briefs })
            .await;
        let actions = match decision {
            Ok(Decision::Management { actions }) => actions,
            Ok(other) => {
                warn!(engine = self.engine.name(), ?other, "Engine answered the wrong request, holding");
                return 0;
            }
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, positions = count, "Engine review failed, holding");
                return 0;
            }
        };

        let by_id: HashMap<&PositionId, &Position> = candidates.iter().map(|p| (&p.id, p)).collect();
        let mut closed = 0;
        for action in actions {
            let Some(position) = by_id.get(&action.position_id) else {
                continue;
            };
            match action.action {
                ActionKind::Close => {
                    info!(
                        position_id = %action.position_id,
                        confidence = action.confidence,
                        rationale = %action.rationale,
                        "Engine recommends close"
                    );
                    if self.close(position, CloseReason::EngineDecision).await {
                        closed += 1;
                    }
                }
                ActionKind::Roll | ActionKind::Adjust => {
                    info!(
                        position_id = %action.position_id,
                        action = ?action.action,
                        rationale = %action.rationale,
                        "Engine suggestion not automated, holding"
                    );
                }
                ActionKind::Hold => {}
            }
        }
        closed
    }
}

#[async_trait]
impl WorkUnit for PositionReview {
    fn name(&self) -> &str {
        "position_review"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        let sync = self.reconcile().await?;
        debug!(?sync, "Positions reconciled");
        if sync.synced_providers == 0 {
            return Ok(TickOutcome::Skipped("no healthy provider".to_string()));
        }

        let positions = self.state.snapshot_positions();
        if positions.is_empty() {
            return Ok(TickOutcome::Skipped("no open positions".to_string()));
        }

        let now = Utc::now();
        let today = now.date_naive();
        let min_age = Duration::minutes(self.config.min_age_minutes);
        let mut rule_closed = 0;
        let mut for_engine = Vec::new();
        for position in positions {
            if let Some(reason) = check_close_rules(&position, &self.config, today) {
                if self.close(&position, reason).await {
                    rule_closed += 1;
                }
                continue;
            }
            if now - position.opened_at >= min_age {
                for_engine.push(position);
            }
        }

        let engine_closed = self.engine_review(for_engine, now).await;
        info!(
            refreshed = sync.refreshed,
            adopted = sync.adopted,
            removed = sync.removed,
            rule_closed,
            engine_closed,
            "Position review complete"
        );
        Ok(TickOutcome::Completed)
    }
}
