//! Concrete work units, one per worker loop.

pub mod alerts;
pub mod discovery;
pub mod execution;
pub mod health;
pub mod position_review;
pub mod risk;

pub use alerts::AlertDispatch;
pub use discovery::OpportunityDiscovery;
pub use execution::Execution;
pub use health::EndpointHealth;
pub use position_review::{PositionReview, Reconciliation};
pub use risk::{aggregate, concentration_level, limit_alerts, PortfolioRisk, RiskMonitor};
