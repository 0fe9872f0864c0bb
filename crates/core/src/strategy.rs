//! Closed set of defined-risk spread strategies and their leg shapes.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::{LegSide, OptionLeg, OptionRight};

/// Strategy tag carried by every opportunity and position.
///
/// Only defined-risk spreads are representable; anything else is rejected
/// at the producer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    PutCreditSpread,
    CallCreditSpread,
    PutDebitSpread,
    CallDebitSpread,
    IronCondor,
}

/// A leg set that does not match its strategy tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LegShapeError {
    #[error("{strategy} expects {expected} legs, found {found}")]
    LegCount {
        strategy: StrategyTag,
        expected: usize,
        found: usize,
    },

    #[error("{strategy} legs must share one expiry")]
    MixedExpiry { strategy: StrategyTag },

    #[error("{strategy} requires {detail}")]
    Shape {
        strategy: StrategyTag,
        detail: &'static str,
    },

    #[error("unknown strategy tag: {0}")]
    UnknownTag(String),
}

impl StrategyTag {
    pub const ALL: [Self; 5] = [
        Self::PutCreditSpread,
        Self::CallCreditSpread,
        Self::PutDebitSpread,
        Self::CallDebitSpread,
        Self::IronCondor,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PutCreditSpread => "put_credit_spread",
            Self::CallCreditSpread => "call_credit_spread",
            Self::PutDebitSpread => "put_debit_spread",
            Self::CallDebitSpread => "call_debit_spread",
            Self::IronCondor => "iron_condor",
        }
    }

    /// True when the position is opened for a net credit.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        matches!(
            self,
            Self::PutCreditSpread | Self::CallCreditSpread | Self::IronCondor
        )
    }

    #[must_use]
    pub const fn leg_count(self) -> usize {
        match self {
            Self::IronCondor => 4,
            _ => 2,
        }
    }

    /// Checks that `legs` form this strategy.
    ///
    /// # Errors
    ///
    /// Returns [`LegShapeError`] describing the first mismatch.
    pub fn validate_legs(self, legs: &[OptionLeg]) -> Result<(), LegShapeError> {
        if legs.len() != self.leg_count() {
            return Err(LegShapeError::LegCount {
                strategy: self,
                expected: self.leg_count(),
                found: legs.len(),
            });
        }
        if legs.windows(2).any(|w| w[0].expiry != w[1].expiry) {
            return Err(LegShapeError::MixedExpiry { strategy: self });
        }

        let strike = |right, side| find_strike(legs, right, side);
        let shape_err = |detail| LegShapeError::Shape {
            strategy: self,
            detail,
        };

        match self {
            Self::PutCreditSpread => match (
                strike(OptionRight::Put, LegSide::Short),
                strike(OptionRight::Put, LegSide::Long),
            ) {
                (Some(short), Some(long)) if short > long => Ok(()),
                _ => Err(shape_err("a short put above a long put")),
            },
            Self::CallCreditSpread => match (
                strike(OptionRight::Call, LegSide::Short),
                strike(OptionRight::Call, LegSide::Long),
            ) {
                (Some(short), Some(long)) if short < long => Ok(()),
                _ => Err(shape_err("a short call below a long call")),
            },
            Self::PutDebitSpread => match (
                strike(OptionRight::Put, LegSide::Long),
                strike(OptionRight::Put, LegSide::Short),
            ) {
                (Some(long), Some(short)) if long > short => Ok(()),
                _ => Err(shape_err("a long put above a short put")),
            },
            Self::CallDebitSpread => match (
                strike(OptionRight::Call, LegSide::Long),
                strike(OptionRight::Call, LegSide::Short),
            ) {
                (Some(long), Some(short)) if long < short => Ok(()),
                _ => Err(shape_err("a long call below a short call")),
            },
            Self::IronCondor => match (
                strike(OptionRight::Put, LegSide::Long),
                strike(OptionRight::Put, LegSide::Short),
                strike(OptionRight::Call, LegSide::Short),
                strike(OptionRight::Call, LegSide::Long),
            ) {
                (Some(lp), Some(sp), Some(sc), Some(lc)) if lp < sp && sp < sc && sc < lc => {
                    Ok(())
                }
                _ => Err(shape_err(
                    "long put < short put < short call < long call strikes",
                )),
            },
        }
    }
}

fn find_strike(legs: &[OptionLeg], right: OptionRight, side: LegSide) -> Option<Decimal> {
    legs.iter()
        .find(|leg| leg.right == right && leg.side == side)
        .map(|leg| leg.strike)
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyTag {
    type Err = LegShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == normalized)
            .ok_or_else(|| LegShapeError::UnknownTag(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 12, 18).unwrap()
    }

    fn leg(right: OptionRight, side: LegSide, strike: Decimal) -> OptionLeg {
        OptionLeg {
            right,
            side,
            strike,
            expiry: expiry(),
        }
    }

    #[test]
    fn test_put_credit_spread_shape() {
        let legs = vec![
            leg(OptionRight::Put, LegSide::Short, dec!(450)),
            leg(OptionRight::Put, LegSide::Long, dec!(445)),
        ];
        assert!(StrategyTag::PutCreditSpread.validate_legs(&legs).is_ok());
        assert!(StrategyTag::PutDebitSpread.validate_legs(&legs).is_err());
    }

    #[test]
    fn test_iron_condor_strike_order() {
        let legs = vec![
            leg(OptionRight::Put, LegSide::Long, dec!(430)),
            leg(OptionRight::Put, LegSide::Short, dec!(440)),
            leg(OptionRight::Call, LegSide::Short, dec!(470)),
            leg(OptionRight::Call, LegSide::Long, dec!(480)),
        ];
        assert!(StrategyTag::IronCondor.validate_legs(&legs).is_ok());

        let crossed = vec![
            leg(OptionRight::Put, LegSide::Long, dec!(430)),
            leg(OptionRight::Put, LegSide::Short, dec!(475)),
            leg(OptionRight::Call, LegSide::Short, dec!(470)),
            leg(OptionRight::Call, LegSide::Long, dec!(480)),
        ];
        assert!(matches!(
            StrategyTag::IronCondor.validate_legs(&crossed),
            Err(LegShapeError::Shape { .. })
        ));
    }

    #[test]
    fn test_leg_count_and_expiry() {
        let single = vec![leg(OptionRight::Call, LegSide::Short, dec!(100))];
        assert!(matches!(
            StrategyTag::CallCreditSpread.validate_legs(&single),
            Err(LegShapeError::LegCount {
                expected: 2,
                found: 1,
                ..
            })
        ));

        let mut mixed = vec![
            leg(OptionRight::Call, LegSide::Short, dec!(100)),
            leg(OptionRight::Call, LegSide::Long, dec!(105)),
        ];
        mixed[1].expiry = NaiveDate::from_ymd_opt(2027, 1, 15).unwrap();
        assert!(matches!(
            StrategyTag::CallCreditSpread.validate_legs(&mixed),
            Err(LegShapeError::MixedExpiry { .. })
        ));
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            "iron_condor".parse::<StrategyTag>().unwrap(),
            StrategyTag::IronCondor
        );
        assert_eq!(
            "Put Credit Spread".parse::<StrategyTag>().unwrap(),
            StrategyTag::PutCreditSpread
        );
        assert!("naked_call".parse::<StrategyTag>().is_err());
        assert!(StrategyTag::IronCondor.is_credit());
        assert!(!StrategyTag::CallDebitSpread.is_credit());
    }
}
