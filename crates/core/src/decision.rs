//! Requests to and structured answers from the decision engine.

use serde::{Deserialize, Serialize};

use crate::opportunity::OpportunityId;
use crate::position::PositionId;
use crate::strategy::StrategyTag;

/// Compact view of an open position handed to the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBrief {
    pub position_id: PositionId,
    pub symbol: String,
    pub strategy: StrategyTag,
    pub quantity: u32,
    pub days_to_expiry: i64,
    pub unrealized_pnl: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub probability_of_profit: f64,
    pub delta: f64,
    pub theta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityBrief {
    pub opportunity_id: OpportunityId,
    pub symbol: String,
    pub strategy: StrategyTag,
    pub score: f64,
    pub probability_of_profit: f64,
    pub expected_value: f64,
    pub max_loss: f64,
    pub implied_vol: f64,
}

/// Portfolio aggregates handed to the decision engine for a risk read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBrief {
    pub position_count: usize,
    pub total_delta: f64,
    pub total_gamma: f64,
    pub total_theta: f64,
    pub total_vega: f64,
    pub total_max_loss: f64,
    pub largest_strategy_share: f64,
    pub indicator_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionRequest {
    ManagePositions { positions: Vec<PositionBrief> },
    PrioritizeOpportunities { opportunities: Vec<OpportunityBrief> },
    AssessRisk { portfolio: RiskBrief },
}

impl DecisionRequest {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ManagePositions { .. } => "manage_positions",
            Self::PrioritizeOpportunities { .. } => "prioritize_opportunities",
            Self::AssessRisk { .. } => "assess_risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Hold,
    Close,
    Roll,
    Adjust,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementAction {
    pub position_id: PositionId,
    pub action: ActionKind,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOpportunity {
    pub opportunity_id: OpportunityId,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0 (calm) to 10 (act now).
    pub alert_level: u8,
    pub summary: String,
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// Structured answer; the variant always matches the request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Management { actions: Vec<ManagementAction> },
    /// Highest priority first. An empty ranking means "no opinion".
    Prioritization { ranking: Vec<RankedOpportunity> },
    Risk(RiskAssessment),
}
