//! Options desk orchestrator.
//!
//! Six work units share one [`SharedState`](optdesk_core::SharedState):
//!
//! - `position_review`: reconcile with brokers, apply close rules, ask the
//!   decision engine about the rest
//! - `opportunity_discovery`: scan, score, rank and queue new spreads
//! - `risk_assessment`: aggregate greeks and raise limit alerts
//! - `execution`: size and submit the best queued opportunities
//! - `alert_dispatch`: log pending alerts by severity
//! - `endpoint_health`: probe unhealthy providers
//!
//! [`Orchestrator`] builds one [`WorkerLoop`](optdesk_scheduler::WorkerLoop)
//! per unit and starts and stops them together.

pub mod orchestrator;
pub mod rules;
pub mod scoring;
pub mod sizing;
pub mod units;

pub use orchestrator::{BuildError, Orchestrator, OrchestratorBuilder, OrchestratorStatus};
pub use rules::{check_close_rules, CloseReason};
pub use scoring::{composite_score, Discard, OpportunityScorer};
pub use sizing::{check_allocation, fit_quantity, size_order, AllocationCheck};
