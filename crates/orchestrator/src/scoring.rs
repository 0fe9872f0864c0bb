//! Pricing and scoring of scanner candidates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use optdesk_core::{
    MarketSnapshot, Opportunity, OpportunityCandidate, OpportunityMetrics, PricingKernel,
    ScoringWeights,
};
use thiserror::Error;

/// Volume at which the liquidity component saturates.
const VOLUME_SATURATION: f64 = 1000.0;
/// Bid/ask width (fraction of premium) at which the spread component hits zero.
const SPREAD_CEILING: f64 = 0.10;
/// Implied volatility at which the premium-richness component saturates.
const IV_SATURATION: f64 = 0.50;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Discard {
    #[error(transparent)]
    LegShape(#[from] optdesk_core::LegShapeError),

    #[error("expected value {0:.2} is not positive")]
    NonPositiveEv(f64),

    #[error("score {score:.3} below minimum {min:.3}")]
    BelowMinimum { score: f64, min: f64 },
}

/// Weighted blend of confidence, liquidity, tightness and premium richness.
#[must_use]
pub fn composite_score(
    weights: &ScoringWeights,
    confidence: f64,
    volume: u64,
    bid_ask_spread: f64,
    implied_vol: f64,
) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let volume_score = (volume as f64 / VOLUME_SATURATION).min(1.0);
    let spread_score = 1.0 - (bid_ask_spread.max(0.0) / SPREAD_CEILING).min(1.0);
    let iv_score = (implied_vol.max(0.0) / IV_SATURATION).min(1.0);

    weights.confidence * confidence.clamp(0.0, 1.0)
        + weights.volume * volume_score
        + weights.spread * spread_score
        + weights.iv * iv_score
}

pub struct OpportunityScorer {
    kernel: Arc<dyn PricingKernel>,
    weights: ScoringWeights,
    min_score: f64,
    risk_free_rate: f64,
}

impl OpportunityScorer {
    #[must_use]
    pub fn new(kernel: Arc<dyn PricingKernel>, weights: ScoringWeights, risk_free_rate: f64) -> Self {
        Self {
            kernel,
            weights,
            min_score: 0.0,
            risk_free_rate,
        }
    }

    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Prices one candidate and scores it, using its probability of profit
    /// as the confidence until an engine says otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Discard`] if the legs do not match the strategy, the
    /// expected value is not positive, or the score is below the minimum.
    pub fn score(
        &self,
        candidate: OpportunityCandidate,
        as_of: DateTime<Utc>,
    ) -> Result<Opportunity, Discard> {
        candidate.strategy.validate_legs(&candidate.legs)?;

        let position = candidate.provisional_position(as_of);
        let market = MarketSnapshot {
            underlying_price: candidate.underlying_price,
            implied_vol: candidate.implied_vol,
            risk_free_rate: self.risk_free_rate,
            valuation_date: as_of.date_naive(),
        };
        let priced = self.kernel.compute_metrics(&position, &market);
        if priced.expected_value.is_nan() || priced.expected_value <= 0.0 {
            return Err(Discard::NonPositiveEv(priced.expected_value));
        }

        let confidence = priced.probability_of_profit;
        let score = composite_score(
            &self.weights,
            confidence,
            candidate.volume,
            candidate.bid_ask_spread,
            candidate.implied_vol,
        );
        if score < self.min_score {
            return Err(Discard::BelowMinimum {
                score,
                min: self.min_score,
            });
        }

        let metrics = OpportunityMetrics {
            probability_of_profit: priced.probability_of_profit,
            expected_value: priced.expected_value,
            max_profit: priced.max_profit,
            max_loss: priced.max_loss,
            implied_vol: candidate.implied_vol,
            underlying_price: candidate.underlying_price,
            volume: candidate.volume,
            bid_ask_spread: candidate.bid_ask_spread,
            confidence,
        };
        Ok(Opportunity::scored(candidate, score, metrics, as_of))
    }

    /// A new opportunity carrying an engine-supplied confidence.
    #[must_use]
    pub fn with_confidence(
        &self,
        opportunity: &Opportunity,
        confidence: f64,
        as_of: DateTime<Utc>,
    ) -> Opportunity {
        let mut metrics = opportunity.metrics().clone();
        metrics.confidence = confidence.clamp(0.0, 1.0);
        let score = composite_score(
            &self.weights,
            metrics.confidence,
            metrics.volume,
            metrics.bid_ask_spread,
            metrics.implied_vol,
        );
        opportunity.rescored(score, metrics, as_of)
    }
}

impl std::fmt::Debug for OpportunityScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpportunityScorer")
            .field("weights", &self.weights)
            .field("min_score", &self.min_score)
            .field("risk_free_rate", &self.risk_free_rate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optdesk_core::{LegSide, OptionLeg, OptionRight, StrategyTag};
    use optdesk_pricing::BlackScholesKernel;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn scorer() -> OpportunityScorer {
        OpportunityScorer::new(
            Arc::new(BlackScholesKernel::new()),
            ScoringWeights::default(),
            0.05,
        )
    }

    fn put_credit(premium: Decimal, short: Decimal, long: Decimal) -> OpportunityCandidate {
        let expiry = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        OpportunityCandidate {
            symbol: "SPY".to_string(),
            strategy: StrategyTag::PutCreditSpread,
            legs: vec![
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Short,
                    strike: short,
                    expiry,
                },
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Long,
                    strike: long,
                    expiry,
                },
            ],
            premium,
            underlying_price: 500.0,
            implied_vol: 0.20,
            volume: 400,
            open_interest: 2000,
            bid_ask_spread: 0.05,
        }
    }

    fn as_of() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_composite_score_components() {
        let w = ScoringWeights::default();
        // every component at its maximum
        assert!((composite_score(&w, 1.0, 5000, 0.0, 0.9) - 1.0).abs() < 1e-12);
        // every component at zero
        assert!(composite_score(&w, 0.0, 0, 0.25, 0.0).abs() < 1e-12);
        // 0.4*0.5 + 0.2*0.5 + 0.2*0.5 + 0.2*0.5
        assert!((composite_score(&w, 0.5, 500, 0.05, 0.25) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_scores_reasonable_credit_spread() {
        let opp = scorer().score(put_credit(dec!(1.60), dec!(475), dec!(470)), as_of()).unwrap();
        assert!(opp.score() > 0.0 && opp.score() <= 1.0);
        assert!(opp.metrics().expected_value > 0.0);
        assert!((opp.metrics().confidence - opp.metrics().probability_of_profit).abs() < 1e-12);
    }

    #[test]
    fn test_discards_negative_ev() {
        // almost no credit for a near-the-money spread
        let err = scorer()
            .score(put_credit(dec!(0.05), dec!(500), dec!(495)), as_of())
            .unwrap_err();
        assert!(matches!(err, Discard::NonPositiveEv(_)));
    }

    #[test]
    fn test_discards_bad_leg_shape() {
        let err = scorer()
            .score(put_credit(dec!(1.00), dec!(470), dec!(475)), as_of())
            .unwrap_err();
        assert!(matches!(err, Discard::LegShape(_)));
    }

    #[test]
    fn test_min_score_filter() {
        let err = scorer()
            .with_min_score(0.99)
            .score(put_credit(dec!(1.60), dec!(475), dec!(470)), as_of())
            .unwrap_err();
        assert!(matches!(err, Discard::BelowMinimum { .. }));
    }

    #[test]
    fn test_engine_confidence_rescores_with_new_id() {
        let s = scorer();
        let opp = s.score(put_credit(dec!(1.60), dec!(475), dec!(470)), as_of()).unwrap();
        let boosted = s.with_confidence(&opp, 1.0, as_of());
        assert_ne!(boosted.id(), opp.id());
        assert!((boosted.metrics().confidence - 1.0).abs() < f64::EPSILON);
        assert!(boosted.score() >= opp.score());
    }
}
