//! Order sizing and capital allocation.
//!
//! Keeps the total defined risk of open spreads within a share of net
//! liquidation.

use optdesk_core::ExecutionConfig;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// IV (as a decimal) above which orders shrink.
const IV_PIVOT: f64 = 0.20;

/// Number of spread units to open for one opportunity.
///
/// Starts from `risk_budget_pct` of net liquidation, scales by
/// `0.5 + 0.5 * confidence` and shrinks as implied volatility rises above
/// 20%, then divides by the worst-case loss of one unit. Always within the
/// configured quantity bounds.
#[must_use]
pub fn size_order(
    net_liquidation: Decimal,
    confidence: f64,
    implied_vol: f64,
    max_loss_per_unit: Decimal,
    config: &ExecutionConfig,
) -> u32 {
    let base = net_liquidation.to_f64().unwrap_or(0.0) * config.risk_budget_pct;
    let confidence_multiplier = 0.5 + 0.5 * confidence.clamp(0.0, 1.0);
    let iv_multiplier = (1.0 - (implied_vol - IV_PIVOT).max(0.0)).max(0.0);
    let budget = base * confidence_multiplier * iv_multiplier;

    let per_unit = max_loss_per_unit.to_f64().unwrap_or(0.0);
    let units = if per_unit > 0.0 && budget.is_finite() {
        (budget / per_unit).floor()
    } else {
        0.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let units = units.clamp(0.0, f64::from(config.max_quantity)) as u32;
    units.max(config.min_quantity).min(config.max_quantity)
}

/// Result of an allocation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationCheck {
    Approved {
        remaining_capacity: Decimal,
        utilization: Decimal,
    },
    Rejected {
        current: Decimal,
        would_be: Decimal,
        limit: Decimal,
    },
}

impl AllocationCheck {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

fn allocation_limit(net_liquidation: Decimal, config: &ExecutionConfig) -> Decimal {
    let pct = Decimal::from_f64(config.max_allocation_pct).unwrap_or(Decimal::ZERO);
    (net_liquidation * pct).max(Decimal::ZERO)
}

/// Checks whether adding `new_risk` keeps total defined risk within the cap.
#[must_use]
pub fn check_allocation(
    new_risk: Decimal,
    current_risk: Decimal,
    net_liquidation: Decimal,
    config: &ExecutionConfig,
) -> AllocationCheck {
    let limit = allocation_limit(net_liquidation, config);
    let after_trade = current_risk + new_risk;

    if after_trade > limit || limit.is_zero() {
        AllocationCheck::Rejected {
            current: current_risk,
            would_be: after_trade,
            limit,
        }
    } else {
        AllocationCheck::Approved {
            remaining_capacity: limit - after_trade,
            utilization: after_trade / limit,
        }
    }
}

/// Largest quantity no greater than `desired` that fits the allocation cap,
/// or `None` if not even the minimum fits.
#[must_use]
pub fn fit_quantity(
    desired: u32,
    risk_per_unit: Decimal,
    current_risk: Decimal,
    net_liquidation: Decimal,
    config: &ExecutionConfig,
) -> Option<u32> {
    if risk_per_unit <= Decimal::ZERO {
        return Some(desired);
    }
    let room = allocation_limit(net_liquidation, config) - current_risk;
    if room <= Decimal::ZERO {
        return None;
    }
    let fits = (room / risk_per_unit).floor().to_u32().unwrap_or(u32::MAX);
    let quantity = desired.min(fits);
    (quantity >= config.min_quantity).then_some(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_size_scales_with_confidence() {
        let config = ExecutionConfig::default();
        // 1% of 100k = 1000; full confidence, calm IV; 1000 / 200 = 5
        assert_eq!(size_order(dec!(100000), 1.0, 0.18, dec!(200), &config), 5);
        // half confidence -> 0.75x -> 750 / 200 = 3
        assert_eq!(size_order(dec!(100000), 0.5, 0.18, dec!(200), &config), 3);
    }

    #[test]
    fn test_size_shrinks_in_high_iv() {
        let config = ExecutionConfig::default();
        // IV 0.60 -> multiplier 0.6 -> 600 / 200 = 3
        assert_eq!(size_order(dec!(100000), 1.0, 0.60, dec!(200), &config), 3);
    }

    #[test]
    fn test_size_respects_bounds() {
        let config = ExecutionConfig::default();
        assert_eq!(size_order(dec!(10000000), 1.0, 0.1, dec!(100), &config), 10);
        assert_eq!(size_order(dec!(1000), 0.0, 0.9, dec!(500), &config), 1);
        assert_eq!(size_order(dec!(100000), 1.0, 0.2, Decimal::ZERO, &config), 1);
    }

    #[test]
    fn test_size_with_inverted_bounds_does_not_panic() {
        let config = ExecutionConfig {
            min_quantity: 5,
            max_quantity: 2,
            ..ExecutionConfig::default()
        };
        assert_eq!(size_order(dec!(100000), 1.0, 0.18, dec!(200), &config), 2);
    }

    #[test]
    fn test_allocation_approves_within_limit() {
        let config = ExecutionConfig::default(); // 25%
        let check = check_allocation(dec!(2000), dec!(5000), dec!(100000), &config);
        assert_eq!(
            check,
            AllocationCheck::Approved {
                remaining_capacity: dec!(18000),
                utilization: dec!(0.28),
            }
        );
    }

    #[test]
    fn test_allocation_rejects_over_limit() {
        let config = ExecutionConfig::default();
        let check = check_allocation(dec!(6000), dec!(20000), dec!(100000), &config);
        assert!(!check.is_approved());
    }

    #[test]
    fn test_fit_quantity_shrinks_to_room() {
        let config = ExecutionConfig::default();
        // limit 25000, used 24000, room 1000 at 400 per unit -> 2
        assert_eq!(
            fit_quantity(5, dec!(400), dec!(24000), dec!(100000), &config),
            Some(2)
        );
        assert_eq!(
            fit_quantity(5, dec!(400), dec!(24800), dec!(100000), &config),
            None
        );
        assert_eq!(
            fit_quantity(3, dec!(400), Decimal::ZERO, dec!(100000), &config),
            Some(3)
        );
    }
}
