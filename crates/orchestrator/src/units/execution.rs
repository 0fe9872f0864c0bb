//! Execution: turn the best pending opportunities into orders.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use optdesk_core::position::max_loss;
use optdesk_core::{
    ExecutionConfig, ExternalError, Opportunity, OrderIntent, OrderRequest, OrderResult, Position,
    PositionId, PositionValuation, ProviderId, SharedState,
};
use optdesk_endpoints::EndpointRegistry;
use optdesk_scheduler::{TickOutcome, WorkUnit};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::sizing::{fit_quantity, size_order};

pub struct Execution {
    state: Arc<SharedState>,
    registry: Arc<EndpointRegistry>,
    config: ExecutionConfig,
}

/// What happened to one attempted opportunity.
enum Attempt {
    Filled,
    /// Not tradeable now and not worth retrying.
    Dropped,
    /// Failed for a reason expected to clear; put back in the queue.
    Retry(ExternalError),
}

impl Execution {
    #[must_use]
    pub fn new(state: Arc<SharedState>, registry: Arc<EndpointRegistry>, config: ExecutionConfig) -> Self {
        Self {
            state,
            registry,
            config,
        }
    }

    fn committed_risk(&self) -> Decimal {
        self.state.snapshot_positions().iter().map(Position::max_loss).sum()
    }

    fn record_fill(&self, provider: &ProviderId, opportunity: &Opportunity, order: &OrderRequest, fill: &OrderResult) {
        let price = fill.fill_price.unwrap_or(order.limit_price);
        let now = Utc::now();
        let position = Position {
            id: fill
                .position_id
                .clone()
                .unwrap_or_else(|| PositionId::new(fill.order_id.clone())),
            provider: provider.clone(),
            symbol: order.symbol.clone(),
            strategy: order.strategy,
            legs: order.legs.clone(),
            quantity: fill.filled_quantity,
            entry_price: price,
            opened_at: fill.timestamp,
            valuation: Some(PositionValuation {
                mark: price,
                underlying_price: opportunity.metrics().underlying_price,
                implied_vol: opportunity.metrics().implied_vol,
                as_of: now,
            }),
        };
        info!(
            provider = %provider,
            position_id = %position.id,
            symbol = %position.symbol,
            strategy = %position.strategy,
            quantity = position.quantity,
            price = %price,
            score = opportunity.score(),
            "Opportunity filled"
        );
        self.state.upsert_position(position);
    }

    async fn attempt(
        &self,
        provider: &ProviderId,
        opportunity: &Opportunity,
        net_liquidation: Decimal,
        committed: &mut Decimal,
    ) -> Attempt {
        let risk_per_unit = max_loss(opportunity.strategy(), opportunity.legs(), opportunity.premium(), 1);
        let desired = size_order(
            net_liquidation,
            opportunity.metrics().confidence,
            opportunity.metrics().implied_vol,
            risk_per_unit,
            &self.config,
        );
        let Some(quantity) = fit_quantity(desired, risk_per_unit, *committed, net_liquidation, &self.config) else {
            info!(
                opportunity = %opportunity.id(),
                symbol = opportunity.symbol(),
                committed = %committed,
                "Allocation cap reached, opportunity dropped"
            );
            return Attempt::Dropped;
        };

        let order = OrderRequest {
            client_order_id: format!("open-{}", opportunity.id()),
            symbol: opportunity.symbol().to_string(),
            strategy: opportunity.strategy(),
            legs: opportunity.legs().to_vec(),
            quantity,
            limit_price: opportunity.premium(),
            intent: OrderIntent::Open,
            position_id: None,
        };
        let submitted = order.clone();
        let result = self
            .registry
            .execute_on(provider, "submit_order", |ep| async move { ep.submit_order(submitted).await })
            .await;

        match result {
            Ok(fill) if fill.is_filled() => {
                *committed += risk_per_unit * Decimal::from(fill.filled_quantity);
                self.record_fill(provider, opportunity, &order, &fill);
                Attempt::Filled
            }
            Ok(fill) => {
                warn!(
                    opportunity = %opportunity.id(),
                    status = ?fill.status,
                    message = fill.message.as_deref().unwrap_or(""),
                    "Order not filled, opportunity dropped"
                );
                Attempt::Dropped
            }
            Err(e) if e.is_transient() || e == ExternalError::NoHealthyProvider => Attempt::Retry(e),
            Err(e) => {
                warn!(opportunity = %opportunity.id(), error = %e, "Order refused, opportunity dropped");
                Attempt::Dropped
            }
        }
    }
}

#[async_trait]
impl WorkUnit for Execution {
    fn name(&self) -> &str {
        "execution"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        // Check before draining so an outage never empties the queue.
        let provider = match self.registry.pick_healthy() {
            Ok(provider) => provider,
            Err(e) => return Ok(TickOutcome::Skipped(e.to_string())),
        };

        let mut batch = self.state.drain_opportunities();
        if batch.is_empty() {
            return Ok(TickOutcome::Skipped("no pending opportunities".to_string()));
        }

        let account = self
            .registry
            .execute_on(&provider, "get_account", |ep| async move { ep.get_account().await })
            .await;
        let account = match account {
            Ok(account) => account,
            Err(e) => {
                let restored = self.state.restore_opportunities(batch);
                debug!(restored, "Opportunities restored after account failure");
                return match e {
                    ExternalError::NoHealthyProvider => Ok(TickOutcome::Skipped(e.to_string())),
                    e => Err(anyhow!(e).context(format!("account lookup on {provider} failed"))),
                };
            }
        };

        let deferred = batch.split_off(self.config.per_tick.min(batch.len()));
        let mut committed = self.committed_risk();
        let mut to_restore = Vec::new();
        let mut filled = 0;
        let mut dropped = 0;
        let mut failure = None;

        let mut attempts = batch.into_iter();
        for opportunity in attempts.by_ref() {
            match self.attempt(&provider, &opportunity, account.net_liquidation, &mut committed).await {
                Attempt::Filled => filled += 1,
                Attempt::Dropped => dropped += 1,
                Attempt::Retry(e) => {
                    warn!(provider = %provider, opportunity = %opportunity.id(), error = %e, "Order failed, will retry");
                    to_restore.push(opportunity);
                    failure = Some(e);
                    break;
                }
            }
        }
        to_restore.extend(attempts);
        to_restore.extend(deferred);
        let restored = self.state.restore_opportunities(to_restore);

        info!(provider = %provider, filled, dropped, restored, "Execution pass complete");
        match failure {
            Some(e) => Err(anyhow!(e).context("order submission failed")),
            None => Ok(TickOutcome::Completed),
        }
    }
}
