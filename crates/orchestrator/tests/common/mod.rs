#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use optdesk_core::{
    BrokerPosition, Decision, DecisionEngine, DecisionRequest, ExternalResult, IndicatorSource,
    LegSide, MarketScanner, OpportunityCandidate, OptionLeg, OptionRight, PositionId, ProviderId,
    RiskAssessment, StrategyTag,
};
use optdesk_endpoints::{ClientLimits, EndpointRegistry, PaperBroker, RateLimitedClient, RegistryConfig};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const PROVIDER: &str = "paper";

/// Answers every request with the quietest decision and counts calls.
#[derive(Default)]
pub struct CountingEngine {
    calls: AtomicUsize,
    kinds: Mutex<Vec<&'static str>>,
}

impl CountingEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.lock().clone()
    }
}

#[async_trait]
impl DecisionEngine for CountingEngine {
    async fn decide(&self, request: DecisionRequest) -> ExternalResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kinds.lock().push(request.kind());
        Ok(match request {
            DecisionRequest::ManagePositions { .. } => Decision::Management { actions: Vec::new() },
            DecisionRequest::PrioritizeOpportunities { .. } => {
                Decision::Prioritization { ranking: Vec::new() }
            }
            DecisionRequest::AssessRisk { .. } => Decision::Risk(RiskAssessment {
                alert_level: 0,
                summary: "calm".to_string(),
                concerns: Vec::new(),
            }),
        })
    }

    fn name(&self) -> &str {
        "counting"
    }
}

pub struct StaticScanner(pub Vec<OpportunityCandidate>);

#[async_trait]
impl MarketScanner for StaticScanner {
    async fn scan(&self) -> ExternalResult<Vec<OpportunityCandidate>> {
        Ok(self.0.clone())
    }
}

pub struct FixedIndicator(pub f64);

#[async_trait]
impl IndicatorSource for FixedIndicator {
    async fn fetch_scalar(&self) -> ExternalResult<f64> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// One paper provider with no call spacing; one failure marks it unhealthy.
pub fn paper_registry(broker: Arc<PaperBroker>) -> Arc<EndpointRegistry> {
    let client = RateLimitedClient::new(
        ProviderId::new(PROVIDER),
        broker,
        ClientLimits::default().with_min_interval(Duration::ZERO),
    );
    Arc::new(
        EndpointRegistry::new(
            vec![client],
            ProviderId::new(PROVIDER),
            RegistryConfig::default().with_failure_threshold(1),
        )
        .unwrap(),
    )
}

pub fn expiry_in(days: u64) -> NaiveDate {
    Utc::now().date_naive().checked_add_days(Days::new(days)).unwrap()
}

pub fn put_credit_legs(short: Decimal, long: Decimal, expiry: NaiveDate) -> Vec<OptionLeg> {
    vec![
        OptionLeg {
            right: OptionRight::Put,
            side: LegSide::Short,
            strike: short,
            expiry,
        },
        OptionLeg {
            right: OptionRight::Put,
            side: LegSide::Long,
            strike: long,
            expiry,
        },
    ]
}

/// A 475/470 put credit spread on a 500 underlying, 30 days out.
pub fn spy_candidate() -> OpportunityCandidate {
    OpportunityCandidate {
        symbol: "SPY".to_string(),
        strategy: StrategyTag::PutCreditSpread,
        legs: put_credit_legs(dec!(475), dec!(470), expiry_in(30)),
        premium: dec!(1.60),
        underlying_price: 500.0,
        implied_vol: 0.20,
        volume: 400,
        open_interest: 2000,
        bid_ask_spread: 0.05,
    }
}

/// A 5-wide put credit spread opened two days ago at 1.00, marked at `mark`.
pub fn broker_position(id: &str, mark: Decimal, dte: u64) -> BrokerPosition {
    BrokerPosition {
        position_id: PositionId::new(id),
        symbol: "SPY".to_string(),
        strategy: StrategyTag::PutCreditSpread,
        legs: put_credit_legs(dec!(475), dec!(470), expiry_in(dte)),
        quantity: 1,
        entry_price: dec!(1.00),
        opened_at: Utc::now() - chrono::Duration::days(2),
        mark,
        underlying_price: 500.0,
        implied_vol: 0.20,
    }
}
