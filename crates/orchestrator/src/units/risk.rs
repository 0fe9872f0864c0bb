//! Portfolio risk assessment: aggregate Greeks, concentration and buying
//! power against limits, then one engine read of the whole book.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use optdesk_core::{
    AlertSeverity, Decision, DecisionEngine, DecisionRequest, Greeks, MarketSnapshot, Position,
    PricingKernel, RiskAlert, RiskBrief, RiskConfig, SharedState, StrategyTag,
};
use optdesk_endpoints::EndpointRegistry;
use optdesk_scheduler::{AdaptiveCadence, TickOutcome, WorkUnit};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Engine alert levels at or above this raise an alert.
const ENGINE_ALERT_LEVEL: u8 = 3;

/// Aggregates over every open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRisk {
    pub position_count: usize,
    pub greeks: Greeks,
    pub total_max_loss: f64,
    /// Strategy holding the largest share of entry premium, and that share.
    pub largest_strategy: Option<(StrategyTag, f64)>,
    /// Positions without a mark, left out of the Greeks.
    pub unpriced: usize,
}

impl PortfolioRisk {
    #[must_use]
    pub fn largest_share(&self) -> f64 {
        self.largest_strategy.map_or(0.0, |(_, share)| share)
    }
}

/// Sums Greeks and defined risk, and measures strategy concentration by
/// entry premium.
#[must_use]
pub fn aggregate(positions: &[Position], kernel: &dyn PricingKernel, risk_free_rate: f64) -> PortfolioRisk {
    let mut greeks = Greeks::default();
    let mut total_max_loss = 0.0;
    let mut unpriced = 0;
    let mut by_strategy: BTreeMap<StrategyTag, Decimal> = BTreeMap::new();
    let mut invested = Decimal::ZERO;

    for position in positions {
        total_max_loss += position.max_loss().to_f64().unwrap_or(0.0);
        let value = position.entry_price * Decimal::from(position.quantity);
        *by_strategy.entry(position.strategy).or_default() += value;
        invested += value;

        match &position.valuation {
            Some(valuation) => {
                let market = MarketSnapshot::from_valuation(valuation, risk_free_rate);
                greeks += kernel.compute_metrics(position, &market).greeks;
            }
            None => unpriced += 1,
        }
    }

    let largest_strategy = if invested > Decimal::ZERO {
        by_strategy
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1))
            .map(|(tag, value)| (tag, (value / invested).to_f64().unwrap_or(0.0)))
    } else {
        None
    };

    PortfolioRisk {
        position_count: positions.len(),
        greeks,
        total_max_loss,
        largest_strategy,
        unpriced,
    }
}

/// Concentration risk level on the 0-10 scale: the share scaled by ten,
/// reported as 8, 5, 3 or 0.
#[must_use]
pub fn concentration_level(share: f64) -> u8 {
    let score = (share * 10.0).min(10.0);
    if score >= 8.0 {
        8
    } else if score >= 5.0 {
        5
    } else if score >= 3.0 {
        3
    } else {
        0
    }
}

/// Alerts for every breached limit. `buying_power_usage` is the share of
/// net liquidation already committed, if known.
#[must_use]
pub fn limit_alerts(risk: &PortfolioRisk, config: &RiskConfig, buying_power_usage: Option<f64>) -> Vec<RiskAlert> {
    let mut alerts = Vec::new();
    let greek_limits = [
        ("portfolio_delta", risk.greeks.delta, config.max_portfolio_delta),
        ("portfolio_gamma", risk.greeks.gamma, config.max_portfolio_gamma),
        ("portfolio_vega", risk.greeks.vega, config.max_portfolio_vega),
    ];
    for (metric, value, limit) in greek_limits {
        if value.abs() > limit {
            alerts.push(RiskAlert::new(
                AlertSeverity::Warning,
                metric,
                value,
                limit,
                format!("{metric} {value:.1} exceeds limit {limit:.1}"),
            ));
        }
    }

    // A single position is trivially concentrated.
    if let Some((strategy, share)) = risk.largest_strategy.filter(|_| risk.position_count > 1) {
        if share > config.strategy_concentration_warning {
            let severity = AlertSeverity::from_level(concentration_level(share)).max(AlertSeverity::Caution);
            alerts.push(RiskAlert::new(
                severity,
                "strategy_concentration",
                share,
                config.strategy_concentration_warning,
                format!("{:.0}% of premium in {strategy}", share * 100.0),
            ));
        }
    }

    if let Some(usage) = buying_power_usage {
        if usage > config.buying_power_usage_warning {
            alerts.push(RiskAlert::new(
                AlertSeverity::Warning,
                "buying_power_usage",
                usage,
                config.buying_power_usage_warning,
                format!("{:.0}% of net liquidation committed", usage * 100.0),
            ));
        }
    }
    alerts
}

pub struct RiskMonitor {
    state: Arc<SharedState>,
    registry: Arc<EndpointRegistry>,
    engine: Arc<dyn DecisionEngine>,
    kernel: Arc<dyn PricingKernel>,
    cadence: Option<Arc<AdaptiveCadence>>,
    config: RiskConfig,
    risk_free_rate: f64,
}

impl RiskMonitor {
    #[must_use]
    pub fn new(
        state: Arc<SharedState>,
        registry: Arc<EndpointRegistry>,
        engine: Arc<dyn DecisionEngine>,
        kernel: Arc<dyn PricingKernel>,
        config: RiskConfig,
        risk_free_rate: f64,
    ) -> Self {
        Self {
            state,
            registry,
            engine,
            kernel,
            cadence: None,
            config,
            risk_free_rate,
        }
    }

    /// Includes the latest cadence reading in engine requests.
    #[must_use]
    pub fn with_cadence(mut self, cadence: Arc<AdaptiveCadence>) -> Self {
        self.cadence = Some(cadence);
        self
    }

    async fn buying_power_usage(&self) -> Option<f64> {
        let account = match self
            .registry
            .execute("get_account", |ep| async move { ep.get_account().await })
            .await
        {
            Ok(routed) => routed.value,
            Err(e) => {
                debug!(error = %e, "Account unavailable, skipping buying-power check");
                return None;
            }
        };
        if account.net_liquidation <= Decimal::ZERO {
            return None;
        }
        let free = (account.buying_power / account.net_liquidation).to_f64()?;
        Some((1.0 - free).clamp(0.0, 1.0))
    }

    async fn engine_alert(&self, risk: &PortfolioRisk) -> Option<RiskAlert> {
        let brief = RiskBrief {
            position_count: risk.position_count,
            total_delta: risk.greeks.delta,
            total_gamma: risk.greeks.gamma,
            total_theta: risk.greeks.theta,
            total_vega: risk.greeks.vega,
            total_max_loss: risk.total_max_loss,
            largest_strategy_share: risk.largest_share(),
            indicator_value: self
                .cadence
                .as_ref()
                .and_then(|c| c.last_decision())
                .map(|d| d.reading.value),
        };

        let assessment = match self.engine.decide(DecisionRequest::AssessRisk { portfolio: brief }).await {
            Ok(Decision::Risk(assessment)) => assessment,
            Ok(other) => {
                warn!(engine = self.engine.name(), ?other, "Engine answered the wrong request");
                return None;
            }
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Engine risk read failed");
                return None;
            }
        };

        debug!(level = assessment.alert_level, summary = %assessment.summary, "Engine risk read");
        if assessment.alert_level < ENGINE_ALERT_LEVEL {
            return None;
        }
        let message = if assessment.concerns.is_empty() {
            assessment.summary
        } else {
            format!("{} ({})", assessment.summary, assessment.concerns.join("; "))
        };
        Some(RiskAlert::new(
            AlertSeverity::from_level(assessment.alert_level),
            "engine_alert_level",
            f64::from(assessment.alert_level),
            f64::from(ENGINE_ALERT_LEVEL),
            message,
        ))
    }
}

#[async_trait]
impl WorkUnit for RiskMonitor {
    fn name(&self) -> &str {
        "risk_assessment"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        let positions = self.state.snapshot_positions();
        if positions.is_empty() {
            return Ok(TickOutcome::Skipped("no open positions".to_string()));
        }

        let risk = aggregate(&positions, self.kernel.as_ref(), self.risk_free_rate);
        let usage = self.buying_power_usage().await;
        let mut alerts = limit_alerts(&risk, &self.config, usage);
        if let Some(alert) = self.engine_alert(&risk).await {
            alerts.push(alert);
        }

        let raised = alerts.len();
        for alert in alerts {
            self.state.push_alert(alert);
        }
        info!(
            positions = risk.position_count,
            delta = risk.greeks.delta,
            vega = risk.greeks.vega,
            max_loss = risk.total_max_loss,
            largest_share = risk.largest_share(),
            unpriced = risk.unpriced,
            raised,
            "Risk assessment complete"
        );
        Ok(TickOutcome::Completed)
    }
}
