use std::ops::{Add, AddAssign};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::position::PositionValuation;

/// Risk-free rate used when nothing better is configured.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.05;

/// Market parameters a pricing kernel needs for one underlying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub underlying_price: f64,
    pub implied_vol: f64,
    pub risk_free_rate: f64,
    pub valuation_date: NaiveDate,
}

impl MarketSnapshot {
    #[must_use]
    pub fn from_valuation(valuation: &PositionValuation, risk_free_rate: f64) -> Self {
        Self {
            underlying_price: valuation.underlying_price,
            implied_vol: valuation.implied_vol,
            risk_free_rate,
            valuation_date: valuation.as_of.date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per 1% change in volatility.
    pub vega: f64,
    /// Per 1% change in rates.
    pub rho: f64,
}

impl Greeks {
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            delta: self.delta * factor,
            gamma: self.gamma * factor,
            theta: self.theta * factor,
            vega: self.vega * factor,
            rho: self.rho * factor,
        }
    }
}

impl Add for Greeks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            delta: self.delta + rhs.delta,
            gamma: self.gamma + rhs.gamma,
            theta: self.theta + rhs.theta,
            vega: self.vega + rhs.vega,
            rho: self.rho + rhs.rho,
        }
    }
}

impl AddAssign for Greeks {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Output of the pricing kernel for one position.
///
/// Dollar figures and Greeks cover the whole position, with quantity and the
/// contract multiplier applied (Greeks are share-equivalent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    /// Model value of one spread unit, as a positive premium.
    pub theoretical_value: f64,
    pub probability_of_profit: f64,
    pub expected_value: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub breakevens: Vec<f64>,
    pub greeks: Greeks,
}
