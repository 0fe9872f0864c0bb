//! Closed-form European option pricing and Greeks.

use std::f64::consts::{PI, SQRT_2};

use optdesk_core::{Greeks, OptionRight};

/// Model price and Greeks for one contract of one option (per share).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionQuote {
    pub price: f64,
    pub greeks: Greeks,
}

/// Standard normal CDF, Phi(x) = 0.5 * (1 + erf(x / sqrt(2))).
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / SQRT_2))
}

#[must_use]
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes price and Greeks.
///
/// `t_years` is time to expiry in years. Theta is per calendar day; vega and
/// rho are per 1% move. At or past expiry, or with no volatility, the option
/// is worth its intrinsic value and only delta is non-zero.
#[must_use]
pub fn price_option(
    right: OptionRight,
    spot: f64,
    strike: f64,
    t_years: f64,
    rate: f64,
    vol: f64,
) -> OptionQuote {
    if t_years <= 0.0 || vol <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        return intrinsic(right, spot, strike);
    }

    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * t_years) / (vol * sqrt_t);
    let d2 = d1 - vol * sqrt_t;
    let discount = (-rate * t_years).exp();
    let pdf_d1 = normal_pdf(d1);

    let gamma = pdf_d1 / (spot * vol * sqrt_t);
    let vega = spot * pdf_d1 * sqrt_t / 100.0;
    let decay = -spot * pdf_d1 * vol / (2.0 * sqrt_t);

    let (price, delta, theta, rho) = match right {
        OptionRight::Call => (
            spot * normal_cdf(d1) - strike * discount * normal_cdf(d2),
            normal_cdf(d1),
            (decay - rate * strike * discount * normal_cdf(d2)) / 365.0,
            strike * t_years * discount * normal_cdf(d2) / 100.0,
        ),
        OptionRight::Put => (
            strike * discount * normal_cdf(-d2) - spot * normal_cdf(-d1),
            normal_cdf(d1) - 1.0,
            (decay + rate * strike * discount * normal_cdf(-d2)) / 365.0,
            -strike * t_years * discount * normal_cdf(-d2) / 100.0,
        ),
    };

    OptionQuote {
        price: price.max(0.0),
        greeks: Greeks {
            delta,
            gamma,
            theta,
            vega,
            rho,
        },
    }
}

fn intrinsic(right: OptionRight, spot: f64, strike: f64) -> OptionQuote {
    let (price, delta) = match right {
        OptionRight::Call if spot > strike => (spot - strike, 1.0),
        OptionRight::Put if spot < strike => (strike - spot, -1.0),
        _ => (0.0, 0.0),
    };
    OptionQuote {
        price,
        greeks: Greeks {
            delta,
            ..Greeks::default()
        },
    }
}

/// Risk-neutral probability that the underlying finishes above `level`.
#[must_use]
pub fn probability_above(spot: f64, level: f64, t_years: f64, rate: f64, vol: f64) -> f64 {
    if level <= 0.0 {
        return 1.0;
    }
    if t_years <= 0.0 || vol <= 0.0 {
        return if spot > level { 1.0 } else { 0.0 };
    }
    let sqrt_t = t_years.sqrt();
    let d2 = ((spot / level).ln() + (rate - 0.5 * vol * vol) * t_years) / (vol * sqrt_t);
    normal_cdf(d2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-3;

    #[test]
    fn test_reference_prices() {
        let call = price_option(OptionRight::Call, 100.0, 100.0, 1.0, 0.05, 0.2);
        let put = price_option(OptionRight::Put, 100.0, 100.0, 1.0, 0.05, 0.2);
        assert!((call.price - 10.4506).abs() < EPS, "call {}", call.price);
        assert!((put.price - 5.5735).abs() < EPS, "put {}", put.price);
    }

    #[test]
    fn test_put_call_parity() {
        let (spot, strike, t, r, vol) = (452.0, 440.0, 30.0 / 365.0, 0.05, 0.18);
        let call = price_option(OptionRight::Call, spot, strike, t, r, vol);
        let put = price_option(OptionRight::Put, spot, strike, t, r, vol);
        let parity = spot - strike * (-r * t).exp();
        assert!((call.price - put.price - parity).abs() < 1e-9);
        assert!((call.greeks.delta - put.greeks.delta - 1.0).abs() < 1e-12);
        assert!((call.greeks.gamma - put.greeks.gamma).abs() < 1e-12);
    }

    #[test]
    fn test_greek_signs() {
        let call = price_option(OptionRight::Call, 100.0, 105.0, 0.25, 0.05, 0.3);
        assert!(call.greeks.delta > 0.0 && call.greeks.delta < 1.0);
        assert!(call.greeks.gamma > 0.0);
        assert!(call.greeks.theta < 0.0);
        assert!(call.greeks.vega > 0.0);
        assert!(call.greeks.rho > 0.0);

        let put = price_option(OptionRight::Put, 100.0, 95.0, 0.25, 0.05, 0.3);
        assert!(put.greeks.delta < 0.0 && put.greeks.delta > -1.0);
        assert!(put.greeks.rho < 0.0);
    }

    #[test]
    fn test_expired_is_intrinsic() {
        let itm = price_option(OptionRight::Put, 90.0, 100.0, 0.0, 0.05, 0.2);
        assert!((itm.price - 10.0).abs() < f64::EPSILON);
        assert!((itm.greeks.delta + 1.0).abs() < f64::EPSILON);

        let otm = price_option(OptionRight::Call, 90.0, 100.0, -1.0, 0.05, 0.2);
        assert!(otm.price.abs() < f64::EPSILON);
        assert!(otm.greeks.gamma.abs() < f64::EPSILON);
    }

    #[test]
    fn test_probability_above() {
        let p = probability_above(100.0, 100.0, 0.1, 0.0, 0.2);
        assert!(p > 0.45 && p < 0.5);
        assert!(probability_above(100.0, 50.0, 0.1, 0.05, 0.2) > 0.99);
        assert!(probability_above(100.0, 200.0, 0.1, 0.05, 0.2) < 0.01);
        assert!((probability_above(100.0, 120.0, 0.0, 0.05, 0.2)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(1.3) + normal_cdf(-1.3) - 1.0).abs() < 1e-12);
    }
}
