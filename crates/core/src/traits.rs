use async_trait::async_trait;

use crate::broker::{AccountSummary, BrokerPosition, OrderRequest, OrderResult};
use crate::decision::{Decision, DecisionRequest};
use crate::error::ExternalResult;
use crate::market::{MarketSnapshot, PositionMetrics};
use crate::opportunity::OpportunityCandidate;
use crate::position::Position;

/// Turns a snapshot of positions, opportunities or portfolio risk into a
/// structured decision. May take several seconds and may fail.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(&self, request: DecisionRequest) -> ExternalResult<Decision>;
    fn name(&self) -> &str;
}

/// Pure pricing function. Implementations hold no mutable state and are safe
/// to call from any worker concurrently.
pub trait PricingKernel: Send + Sync {
    fn compute_metrics(&self, position: &Position, market: &MarketSnapshot) -> PositionMetrics;
}

/// One upstream execution endpoint.
#[async_trait]
pub trait BrokerEndpoint: Send + Sync {
    async fn get_positions(&self) -> ExternalResult<Vec<BrokerPosition>>;
    async fn get_account(&self) -> ExternalResult<AccountSummary>;
    async fn submit_order(&self, order: OrderRequest) -> ExternalResult<OrderResult>;
}

/// Source of the scalar that drives adaptive cadence (e.g. a volatility index).
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    async fn fetch_scalar(&self) -> ExternalResult<f64>;
    fn name(&self) -> &str;
}

/// Produces raw candidate trades for the discovery worker.
#[async_trait]
pub trait MarketScanner: Send + Sync {
    async fn scan(&self) -> ExternalResult<Vec<OpportunityCandidate>>;
}
