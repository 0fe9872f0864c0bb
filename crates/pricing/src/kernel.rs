use optdesk_core::{
    Greeks, LegSide, MarketSnapshot, OptionLeg, OptionRight, Position, PositionMetrics,
    PricingKernel, StrategyTag, CONTRACT_MULTIPLIER,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::black_scholes::{price_option, probability_above};

const DAYS_PER_YEAR: f64 = 365.0;

/// Prices every leg with Black-Scholes and derives spread-level risk figures.
///
/// Stateless; one instance can be shared by every worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackScholesKernel;

impl BlackScholesKernel {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn strike(legs: &[OptionLeg], right: OptionRight, side: LegSide) -> Option<f64> {
    legs.iter()
        .find(|leg| leg.right == right && leg.side == side)
        .map(|leg| to_f64(leg.strike))
}

/// Breakeven levels at expiry and the probability of finishing between them.
fn breakevens_and_pop(
    position: &Position,
    market: &MarketSnapshot,
    t_years: f64,
) -> (Vec<f64>, f64) {
    let legs = &position.legs;
    let entry = to_f64(position.entry_price);
    let above = |level: f64| {
        probability_above(
            market.underlying_price,
            level,
            t_years,
            market.risk_free_rate,
            market.implied_vol,
        )
    };

    let found = match position.strategy {
        StrategyTag::PutCreditSpread => strike(legs, OptionRight::Put, LegSide::Short)
            .map(|k| {
                let be = k - entry;
                (vec![be], above(be))
            }),
        StrategyTag::CallCreditSpread => strike(legs, OptionRight::Call, LegSide::Short)
            .map(|k| {
                let be = k + entry;
                (vec![be], 1.0 - above(be))
            }),
        StrategyTag::PutDebitSpread => strike(legs, OptionRight::Put, LegSide::Long)
            .map(|k| {
                let be = k - entry;
                (vec![be], 1.0 - above(be))
            }),
        StrategyTag::CallDebitSpread => strike(legs, OptionRight::Call, LegSide::Long)
            .map(|k| {
                let be = k + entry;
                (vec![be], above(be))
            }),
        StrategyTag::IronCondor => strike(legs, OptionRight::Put, LegSide::Short)
            .zip(strike(legs, OptionRight::Call, LegSide::Short))
            .map(|(short_put, short_call)| {
                let (low, high) = (short_put - entry, short_call + entry);
                (vec![low, high], (above(low) - above(high)).max(0.0))
            }),
    };
    found.unwrap_or_default()
}

impl PricingKernel for BlackScholesKernel {
    fn compute_metrics(&self, position: &Position, market: &MarketSnapshot) -> PositionMetrics {
        let dte = position.days_to_expiry(market.valuation_date).max(0);
        #[allow(clippy::cast_precision_loss)]
        let t_years = dte as f64 / DAYS_PER_YEAR;

        let mut net_value = 0.0;
        let mut unit_greeks = Greeks::default();
        for leg in &position.legs {
            let quote = price_option(
                leg.right,
                market.underlying_price,
                to_f64(leg.strike),
                t_years,
                market.risk_free_rate,
                market.implied_vol,
            );
            let sign = leg.side.sign();
            net_value += sign * quote.price;
            unit_greeks += quote.greeks.scaled(sign);
        }

        // Long legs add value, short legs subtract; a credit spread is a net
        // liability whose closing cost is the negated sum.
        let theoretical_value = if position.strategy.is_credit() {
            -net_value
        } else {
            net_value
        }
        .max(0.0);

        let scale = f64::from(position.quantity) * to_f64(CONTRACT_MULTIPLIER);
        let max_profit = to_f64(position.max_profit());
        let max_loss = to_f64(position.max_loss());
        let (breakevens, probability_of_profit) = breakevens_and_pop(position, market, t_years);
        let expected_value =
            probability_of_profit * max_profit - (1.0 - probability_of_profit) * max_loss;

        PositionMetrics {
            theoretical_value,
            probability_of_profit,
            expected_value,
            max_profit,
            max_loss,
            breakevens,
            greeks: unit_greeks.scaled(scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use optdesk_core::{PositionId, ProviderId};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
    }

    fn leg(right: OptionRight, side: LegSide, strike: Decimal, dte: i64) -> OptionLeg {
        OptionLeg {
            right,
            side,
            strike,
            expiry: today() + Duration::days(dte),
        }
    }

    fn position(strategy: StrategyTag, legs: Vec<OptionLeg>, entry: Decimal) -> Position {
        Position {
            id: PositionId::new("p"),
            provider: ProviderId::new("paper"),
            symbol: "SPY".to_string(),
            strategy,
            legs,
            quantity: 1,
            entry_price: entry,
            opened_at: Utc::now(),
            valuation: None,
        }
    }

    fn market(spot: f64) -> MarketSnapshot {
        MarketSnapshot {
            underlying_price: spot,
            implied_vol: 0.20,
            risk_free_rate: 0.05,
            valuation_date: today(),
        }
    }

    #[test]
    fn test_otm_put_credit_spread() {
        let pos = position(
            StrategyTag::PutCreditSpread,
            vec![
                leg(OptionRight::Put, LegSide::Short, dec!(430), 30),
                leg(OptionRight::Put, LegSide::Long, dec!(425), 30),
            ],
            dec!(0.80),
        );
        let metrics = BlackScholesKernel::new().compute_metrics(&pos, &market(460.0));

        assert!(metrics.theoretical_value > 0.0 && metrics.theoretical_value < 5.0);
        assert!(metrics.probability_of_profit > 0.75, "pop {}", metrics.probability_of_profit);
        assert!((metrics.max_profit - 80.0).abs() < 1e-9);
        assert!((metrics.max_loss - 420.0).abs() < 1e-9);
        assert_eq!(metrics.breakevens.len(), 1);
        assert!((metrics.breakevens[0] - 429.2).abs() < 1e-9);
        // short put spread is long delta, collects theta
        assert!(metrics.greeks.delta > 0.0);
        assert!(metrics.greeks.theta > 0.0);
    }

    #[test]
    fn test_expected_value_identity() {
        let pos = position(
            StrategyTag::CallDebitSpread,
            vec![
                leg(OptionRight::Call, LegSide::Long, dec!(100), 45),
                leg(OptionRight::Call, LegSide::Short, dec!(110), 45),
            ],
            dec!(4.00),
        );
        let m = BlackScholesKernel::new().compute_metrics(&pos, &market(102.0));
        let ev = m.probability_of_profit * m.max_profit - (1.0 - m.probability_of_profit) * m.max_loss;
        assert!((m.expected_value - ev).abs() < 1e-9);
        assert!(m.greeks.delta > 0.0);
    }

    #[test]
    fn test_iron_condor_pop_between_wings() {
        let pos = position(
            StrategyTag::IronCondor,
            vec![
                leg(OptionRight::Put, LegSide::Long, dec!(90), 30),
                leg(OptionRight::Put, LegSide::Short, dec!(95), 30),
                leg(OptionRight::Call, LegSide::Short, dec!(105), 30),
                leg(OptionRight::Call, LegSide::Long, dec!(110), 30),
            ],
            dec!(1.50),
        );
        let m = BlackScholesKernel::new().compute_metrics(&pos, &market(100.0));
        assert_eq!(m.breakevens, vec![93.5, 106.5]);
        assert!(m.probability_of_profit > 0.3 && m.probability_of_profit < 0.9);
        assert!(m.greeks.delta.abs() < 10.0);
        assert!(m.greeks.vega < 0.0);
    }

    #[test]
    fn test_expired_spread_uses_intrinsic() {
        let pos = position(
            StrategyTag::PutCreditSpread,
            vec![
                leg(OptionRight::Put, LegSide::Short, dec!(100), -1),
                leg(OptionRight::Put, LegSide::Long, dec!(95), -1),
            ],
            dec!(1.00),
        );
        let m = BlackScholesKernel::new().compute_metrics(&pos, &market(90.0));
        assert!((m.theoretical_value - 5.0).abs() < 1e-9);
        assert!(m.probability_of_profit.abs() < f64::EPSILON);
    }

    #[test]
    fn test_pure_function() {
        let pos = position(
            StrategyTag::CallCreditSpread,
            vec![
                leg(OptionRight::Call, LegSide::Short, dec!(105), 20),
                leg(OptionRight::Call, LegSide::Long, dec!(110), 20),
            ],
            dec!(1.20),
        );
        let kernel = BlackScholesKernel::new();
        let a = kernel.compute_metrics(&pos, &market(100.0));
        let b = kernel.compute_metrics(&pos, &market(100.0));
        assert_eq!(a, b);
    }
}
