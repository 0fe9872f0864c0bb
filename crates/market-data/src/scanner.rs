//! Opportunity scanners.
//!
//! [`HttpScanner`] pulls ready-made candidates from a screening service.
//! [`WatchlistScanner`] quotes each watchlist underlying and builds standard
//! defined-risk spreads around it, priced with Black-Scholes at an assumed
//! volatility.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use optdesk_core::{
    ExternalResult, LegSide, MarketScanner, OpportunityCandidate, OptionLeg, OptionRight,
    ScannerConfig, StrategyTag, DEFAULT_RISK_FREE_RATE,
};
use optdesk_endpoints::{handle_response, map_reqwest_error};
use optdesk_pricing::price_option;
use reqwest::Client;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::yahoo::QuoteClient;

// =============================================================================
// HTTP scanner
// =============================================================================

/// GETs a JSON array of [`OpportunityCandidate`] from a screening service.
#[derive(Debug, Clone)]
pub struct HttpScanner {
    http: Client,
    url: String,
}

impl HttpScanner {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MarketScanner for HttpScanner {
    async fn scan(&self) -> ExternalResult<Vec<OpportunityCandidate>> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let candidates: Vec<OpportunityCandidate> = handle_response(response).await?;
        debug!(count = candidates.len(), url = %self.url, "Scanner returned candidates");
        Ok(candidates)
    }
}

// =============================================================================
// Watchlist scanner
// =============================================================================

/// Short strikes sit this far out of the money.
const SHORT_STRIKE_OTM: f64 = 0.05;
/// Wing width in strike increments.
const WING_STEPS: u32 = 5;
/// Estimated bid/ask width, as a fraction of premium, for synthetic spreads.
const SYNTHETIC_SPREAD: f64 = 0.05;
const MIN_PREMIUM: f64 = 0.05;

pub struct WatchlistScanner {
    quotes: QuoteClient,
    watchlist: Vec<String>,
    days_to_expiry: u32,
    assumed_vol: f64,
    risk_free_rate: f64,
}

impl WatchlistScanner {
    #[must_use]
    pub fn new(quotes: QuoteClient, watchlist: Vec<String>, days_to_expiry: u32, assumed_vol: f64) -> Self {
        Self {
            quotes,
            watchlist,
            days_to_expiry,
            assumed_vol,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
        }
    }

    #[must_use]
    pub const fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the quote client cannot be built.
    pub fn from_config(config: &ScannerConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            QuoteClient::new(&config.quote_url, config.timeout())?,
            config.watchlist.clone(),
            config.days_to_expiry,
            config.assumed_vol,
        ))
    }

    /// Spreads built around `spot`, expiring on `expiry`. Pure; no I/O.
    #[must_use]
    pub fn candidates_for(&self, symbol: &str, spot: f64, expiry: NaiveDate, today: NaiveDate) -> Vec<OpportunityCandidate> {
        let step = strike_increment(spot);
        let wing = step * f64::from(WING_STEPS);
        let short_put = round_down(spot * (1.0 - SHORT_STRIKE_OTM), step);
        let short_call = round_up(spot * (1.0 + SHORT_STRIKE_OTM), step);

        let put_wing = [
            leg(OptionRight::Put, LegSide::Short, short_put, expiry),
            leg(OptionRight::Put, LegSide::Long, short_put - wing, expiry),
        ];
        let call_wing = [
            leg(OptionRight::Call, LegSide::Short, short_call, expiry),
            leg(OptionRight::Call, LegSide::Long, short_call + wing, expiry),
        ];

        let shapes: [(StrategyTag, Vec<OptionLeg>); 3] = [
            (StrategyTag::PutCreditSpread, put_wing.to_vec()),
            (StrategyTag::CallCreditSpread, call_wing.to_vec()),
            (
                StrategyTag::IronCondor,
                put_wing.iter().chain(call_wing.iter()).cloned().collect(),
            ),
        ];

        let t_years = (expiry - today).num_days().max(0) as f64 / 365.0;
        shapes
            .into_iter()
            .filter_map(|(strategy, legs)| {
                let credit = self.net_credit(&legs, spot, t_years);
                if credit < MIN_PREMIUM {
                    return None;
                }
                Some(OpportunityCandidate {
                    symbol: symbol.to_string(),
                    strategy,
                    premium: Decimal::from_f64(credit)?.round_dp(2),
                    legs,
                    underlying_price: spot,
                    implied_vol: self.assumed_vol,
                    volume: 0,
                    open_interest: 0,
                    bid_ask_spread: SYNTHETIC_SPREAD,
                })
            })
            .collect()
    }

    /// Premium received for the short legs minus premium paid for the long legs.
    fn net_credit(&self, legs: &[OptionLeg], spot: f64, t_years: f64) -> f64 {
        legs.iter()
            .map(|l| {
                let strike = l.strike.to_f64().unwrap_or(0.0);
                let price = price_option(l.right, spot, strike, t_years, self.risk_free_rate, self.assumed_vol).price;
                -l.side.sign() * price
            })
            .sum()
    }
}

fn strike_increment(spot: f64) -> f64 {
    if spot >= 100.0 {
        1.0
    } else if spot >= 25.0 {
        0.5
    } else {
        0.25
    }
}

fn round_down(value: f64, step: f64) -> f64 {
    (value / step).floor() * step
}

fn round_up(value: f64, step: f64) -> f64 {
    (value / step).ceil() * step
}

fn leg(right: OptionRight, side: LegSide, strike: f64, expiry: NaiveDate) -> OptionLeg {
    OptionLeg {
        right,
        side,
        strike: Decimal::from_f64(strike).unwrap_or_default().round_dp(2),
        expiry,
    }
}

#[async_trait]
impl MarketScanner for WatchlistScanner {
    async fn scan(&self) -> ExternalResult<Vec<OpportunityCandidate>> {
        let today = Utc::now().date_naive();
        let expiry = today
            .checked_add_days(Days::new(u64::from(self.days_to_expiry)))
            .unwrap_or(today);

        let mut candidates = Vec::new();
        let mut last_error = None;
        for symbol in &self.watchlist {
            match self.quotes.last_price(symbol).await {
                Ok(spot) => candidates.extend(self.candidates_for(symbol, spot, expiry, today)),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Quote failed, skipping symbol");
                    last_error = Some(e);
                }
            }
        }

        // Every quote failed: report it rather than an empty scan.
        match last_error {
            Some(e) if candidates.is_empty() && !self.watchlist.is_empty() => Err(e),
            _ => Ok(candidates),
        }
    }
}

impl std::fmt::Debug for WatchlistScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchlistScanner")
            .field("watchlist", &self.watchlist)
            .field("days_to_expiry", &self.days_to_expiry)
            .field("assumed_vol", &self.assumed_vol)
            .finish_non_exhaustive()
    }
}

/// Builds the scanner selected in config. `risk_free_rate` prices watchlist
/// spreads.
///
/// # Errors
///
/// Returns an error if the HTTP scanner has no URL or a client cannot be built.
pub fn build_scanner(
    config: &ScannerConfig,
    risk_free_rate: f64,
) -> anyhow::Result<Arc<dyn MarketScanner>> {
    Ok(match config.kind {
        optdesk_core::ScannerKind::Http => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("http scanner requires a url"))?;
            Arc::new(HttpScanner::new(url, config.timeout())?)
        }
        optdesk_core::ScannerKind::Watchlist => {
            Arc::new(WatchlistScanner::from_config(config)?.with_risk_free_rate(risk_free_rate))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scanner() -> WatchlistScanner {
        WatchlistScanner::new(
            QuoteClient::new("http://localhost:1", Duration::from_secs(1)).unwrap(),
            vec!["SPY".to_string()],
            35,
            0.20,
        )
    }

    fn dates() -> (NaiveDate, NaiveDate) {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        (today, NaiveDate::from_ymd_opt(2026, 11, 20).unwrap())
    }

    #[test]
    fn test_candidates_have_valid_shapes() {
        let (today, expiry) = dates();
        let candidates = scanner().candidates_for("SPY", 500.0, expiry, today);

        assert_eq!(candidates.len(), 3);
        for candidate in &candidates {
            candidate.strategy.validate_legs(&candidate.legs).unwrap();
            assert!(candidate.premium > Decimal::ZERO);
            assert!(candidate.premium < dec!(5));
        }
    }

    #[test]
    fn test_strikes_straddle_spot() {
        let (today, expiry) = dates();
        let candidates = scanner().candidates_for("SPY", 498.3, expiry, today);
        let put = candidates
            .iter()
            .find(|c| c.strategy == StrategyTag::PutCreditSpread)
            .unwrap();
        let strikes: Vec<Decimal> = put.legs.iter().map(|l| l.strike).collect();
        assert_eq!(strikes, vec![dec!(473), dec!(468)]);

        let condor = candidates
            .iter()
            .find(|c| c.strategy == StrategyTag::IronCondor)
            .unwrap();
        let put_credit = put.premium;
        assert!(condor.premium > put_credit);
    }

    #[test]
    fn test_expired_spreads_are_skipped() {
        let (today, _) = dates();
        // worthless far-OTM spreads at expiry carry no premium
        assert!(scanner().candidates_for("SPY", 500.0, today, today).is_empty());
    }

    #[test]
    fn test_strike_increment() {
        assert!((strike_increment(450.0) - 1.0).abs() < f64::EPSILON);
        assert!((strike_increment(40.0) - 0.5).abs() < f64::EPSILON);
        assert!((strike_increment(12.0) - 0.25).abs() < f64::EPSILON);
    }
}
