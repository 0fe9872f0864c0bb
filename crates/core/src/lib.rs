pub mod alert;
pub mod broker;
pub mod config;
pub mod config_loader;
pub mod decision;
pub mod error;
pub mod market;
pub mod opportunity;
pub mod position;
pub mod shared_state;
pub mod strategy;
pub mod traits;

pub use alert::{AlertSeverity, RiskAlert};
pub use broker::{
    AccountSummary, BrokerPosition, OrderIntent, OrderRequest, OrderResult, OrderStatus,
};
pub use config::{
    AppConfig, BandConfig, CadenceConfig, DecisionConfig, DecisionKind, DiscoveryConfig,
    EndpointsConfig, ExecutionConfig, IndicatorConfig, ManagementConfig, PricingConfig,
    ProviderConfig, ProviderKind, RiskConfig, ScannerConfig, ScannerKind, ScoringWeights,
    WorkerTiming, WorkersConfig,
};
pub use config_loader::ConfigLoader;
pub use decision::{
    ActionKind, Decision, DecisionRequest, ManagementAction, OpportunityBrief, PositionBrief,
    RankedOpportunity, RiskAssessment, RiskBrief,
};
pub use error::{ExternalError, ExternalResult};
pub use market::{Greeks, MarketSnapshot, PositionMetrics, DEFAULT_RISK_FREE_RATE};
pub use opportunity::{Opportunity, OpportunityCandidate, OpportunityId, OpportunityMetrics};
pub use position::{
    LegSide, OptionLeg, OptionRight, Position, PositionId, PositionValuation, ProviderId,
    CONTRACT_MULTIPLIER,
};
pub use shared_state::{SharedState, StateSummary};
pub use strategy::{LegShapeError, StrategyTag};
pub use traits::{BrokerEndpoint, DecisionEngine, IndicatorSource, MarketScanner, PricingKernel};
