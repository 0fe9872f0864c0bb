use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::strategy::StrategyTag;

/// Shares per option contract.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Identifier of an upstream execution endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PositionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Long,
    Short,
}

impl LegSide {
    /// +1 for long legs, -1 for short legs.
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// One option leg of a spread, one contract per spread unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub right: OptionRight,
    pub side: LegSide,
    pub strike: Decimal,
    pub expiry: NaiveDate,
}

/// Latest mark for a position, refreshed by the position-review worker only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    /// Current cost to close one spread unit, as a positive premium.
    pub mark: Decimal,
    pub underlying_price: f64,
    pub implied_vol: f64,
    pub as_of: DateTime<Utc>,
}

/// An open defined-risk spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub provider: ProviderId,
    pub symbol: String,
    pub strategy: StrategyTag,
    pub legs: Vec<OptionLeg>,
    /// Number of spread units.
    pub quantity: u32,
    /// Premium per spread unit at entry, positive for both credits and debits.
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub valuation: Option<PositionValuation>,
}

/// Maximum distance between paired strikes in a set of legs.
///
/// For an iron condor this is the wider of the two wings.
#[must_use]
pub fn spread_width(legs: &[OptionLeg]) -> Decimal {
    let width_for = |right: OptionRight| {
        let strikes: Vec<Decimal> = legs
            .iter()
            .filter(|l| l.right == right)
            .map(|l| l.strike)
            .collect();
        match (strikes.iter().max(), strikes.iter().min()) {
            (Some(hi), Some(lo)) => *hi - *lo,
            _ => Decimal::ZERO,
        }
    };
    width_for(OptionRight::Put).max(width_for(OptionRight::Call))
}

/// Worst-case loss in dollars for `quantity` units opened at `entry_price`.
#[must_use]
pub fn max_loss(
    strategy: StrategyTag,
    legs: &[OptionLeg],
    entry_price: Decimal,
    quantity: u32,
) -> Decimal {
    let per_unit = if strategy.is_credit() {
        (spread_width(legs) - entry_price).max(Decimal::ZERO)
    } else {
        entry_price
    };
    per_unit * CONTRACT_MULTIPLIER * Decimal::from(quantity)
}

/// Best-case profit in dollars for `quantity` units opened at `entry_price`.
#[must_use]
pub fn max_profit(
    strategy: StrategyTag,
    legs: &[OptionLeg],
    entry_price: Decimal,
    quantity: u32,
) -> Decimal {
    let per_unit = if strategy.is_credit() {
        entry_price
    } else {
        (spread_width(legs) - entry_price).max(Decimal::ZERO)
    };
    per_unit * CONTRACT_MULTIPLIER * Decimal::from(quantity)
}

impl Position {
    /// Earliest leg expiry.
    #[must_use]
    pub fn expiry(&self) -> Option<NaiveDate> {
        self.legs.iter().map(|l| l.expiry).min()
    }

    /// Calendar days until the earliest expiry (negative once expired).
    #[must_use]
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        self.expiry()
            .map_or(0, |expiry| (expiry - today).num_days())
    }

    #[must_use]
    pub fn max_loss(&self) -> Decimal {
        max_loss(self.strategy, &self.legs, self.entry_price, self.quantity)
    }

    #[must_use]
    pub fn max_profit(&self) -> Decimal {
        max_profit(self.strategy, &self.legs, self.entry_price, self.quantity)
    }

    /// Unrealized P&L in dollars against the latest mark, if one exists.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        let mark = self.valuation.as_ref()?.mark;
        let per_unit = if self.strategy.is_credit() {
            self.entry_price - mark
        } else {
            mark - self.entry_price
        };
        Some(per_unit * CONTRACT_MULTIPLIER * Decimal::from(self.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn put_credit(entry: Decimal, mark: Option<Decimal>) -> Position {
        let expiry = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        Position {
            id: PositionId::new("pos-1"),
            provider: ProviderId::new("paper"),
            symbol: "SPY".to_string(),
            strategy: StrategyTag::PutCreditSpread,
            legs: vec![
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Short,
                    strike: dec!(450),
                    expiry,
                },
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Long,
                    strike: dec!(445),
                    expiry,
                },
            ],
            quantity: 2,
            entry_price: entry,
            opened_at: Utc::now(),
            valuation: mark.map(|mark| PositionValuation {
                mark,
                underlying_price: 460.0,
                implied_vol: 0.2,
                as_of: Utc::now(),
            }),
        }
    }

    #[test]
    fn test_credit_spread_risk_bounds() {
        let pos = put_credit(dec!(1.50), None);
        assert_eq!(pos.max_profit(), dec!(300));
        assert_eq!(pos.max_loss(), dec!(700));
        assert_eq!(pos.unrealized_pnl(), None);
    }

    #[test]
    fn test_unrealized_pnl_follows_mark() {
        assert_eq!(
            put_credit(dec!(1.50), Some(dec!(0.75))).unrealized_pnl(),
            Some(dec!(150))
        );
        assert_eq!(
            put_credit(dec!(1.50), Some(dec!(3.00))).unrealized_pnl(),
            Some(dec!(-300))
        );
    }

    #[test]
    fn test_debit_spread_bounds() {
        let mut pos = put_credit(dec!(2.00), None);
        pos.strategy = StrategyTag::PutDebitSpread;
        assert_eq!(pos.max_loss(), dec!(400));
        assert_eq!(pos.max_profit(), dec!(600));
    }

    #[test]
    fn test_days_to_expiry() {
        let pos = put_credit(dec!(1), None);
        let today = NaiveDate::from_ymd_opt(2026, 11, 13).unwrap();
        assert_eq!(pos.days_to_expiry(today), 7);
    }
}
