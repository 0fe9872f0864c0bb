//! Scanner candidates and scored opportunities.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::position::{OptionLeg, Position, PositionId, PositionValuation, ProviderId};
use crate::strategy::StrategyTag;

/// Raw candidate trade as produced by a scanner, before pricing and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCandidate {
    pub symbol: String,
    pub strategy: StrategyTag,
    pub legs: Vec<OptionLeg>,
    /// Net premium per spread unit (credit received or debit paid).
    pub premium: Decimal,
    pub underlying_price: f64,
    pub implied_vol: f64,
    pub volume: u64,
    pub open_interest: u64,
    /// Bid/ask width of the spread as a fraction of premium.
    pub bid_ask_spread: f64,
}

impl OpportunityCandidate {
    /// A one-lot position with this candidate's shape, for pricing before
    /// anything is traded.
    #[must_use]
    pub fn provisional_position(&self, as_of: DateTime<Utc>) -> Position {
        Position {
            id: PositionId::new(format!("candidate-{}-{}", self.symbol, self.strategy)),
            provider: ProviderId::new("scanner"),
            symbol: self.symbol.clone(),
            strategy: self.strategy,
            legs: self.legs.clone(),
            quantity: 1,
            entry_price: self.premium,
            opened_at: as_of,
            valuation: Some(PositionValuation {
                mark: self.premium,
                underlying_price: self.underlying_price,
                implied_vol: self.implied_vol,
                as_of,
            }),
        }
    }
}

/// Supporting figures for a scored opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityMetrics {
    pub probability_of_profit: f64,
    pub expected_value: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub implied_vol: f64,
    pub underlying_price: f64,
    pub volume: u64,
    pub bid_ask_spread: f64,
    /// Decision-engine confidence, or the local estimate when none was given.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpportunityId(Uuid);

impl OpportunityId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OpportunityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A priced, scored candidate trade.
///
/// Fields are private so a scored value cannot be edited in place;
/// [`Opportunity::rescored`] produces a new value with a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    id: OpportunityId,
    symbol: String,
    strategy: StrategyTag,
    legs: Vec<OptionLeg>,
    premium: Decimal,
    score: f64,
    metrics: OpportunityMetrics,
    scored_at: DateTime<Utc>,
}

impl Opportunity {
    #[must_use]
    pub fn scored(
        candidate: OpportunityCandidate,
        score: f64,
        metrics: OpportunityMetrics,
        scored_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OpportunityId::new(),
            symbol: candidate.symbol,
            strategy: candidate.strategy,
            legs: candidate.legs,
            premium: candidate.premium,
            score,
            metrics,
            scored_at,
        }
    }

    /// A copy carrying a new score and id.
    #[must_use]
    pub fn rescored(&self, score: f64, metrics: OpportunityMetrics, scored_at: DateTime<Utc>) -> Self {
        Self {
            id: OpportunityId::new(),
            score,
            metrics,
            scored_at,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn id(&self) -> OpportunityId {
        self.id
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub const fn strategy(&self) -> StrategyTag {
        self.strategy
    }

    #[must_use]
    pub fn legs(&self) -> &[OptionLeg] {
        &self.legs
    }

    #[must_use]
    pub const fn premium(&self) -> Decimal {
        self.premium
    }

    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub const fn metrics(&self) -> &OpportunityMetrics {
        &self.metrics
    }

    #[must_use]
    pub const fn scored_at(&self) -> DateTime<Utc> {
        self.scored_at
    }
}
