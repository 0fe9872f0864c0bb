use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, ensure, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub indicator: IndicatorConfig,
    pub cadence: CadenceConfig,
    pub workers: WorkersConfig,
    pub endpoints: EndpointsConfig,
    pub decision: DecisionConfig,
    pub pricing: PricingConfig,
    pub discovery: DiscoveryConfig,
    pub risk: RiskConfig,
    pub management: ManagementConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub symbol: String,
    /// Quote endpoint; the symbol is appended as a path segment.
    pub url: String,
    pub ttl_secs: u64,
    pub valid_min: f64,
    pub valid_max: f64,
    /// Served when no valid sample has ever been fetched.
    pub default_value: f64,
    pub fetch_timeout_secs: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            symbol: "^VIX".to_string(),
            url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            ttl_secs: 300,
            valid_min: 5.0,
            valid_max: 80.0,
            default_value: 20.0,
            fetch_timeout_secs: 10,
        }
    }
}

impl IndicatorConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// One regime band as written in config. `up_to = None` marks the catch-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub label: String,
    pub up_to: Option<f64>,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub bands: Vec<BandConfig>,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                BandConfig {
                    label: "LOW".to_string(),
                    up_to: Some(20.0),
                    interval_secs: 3600,
                },
                BandConfig {
                    label: "MEDIUM".to_string(),
                    up_to: Some(25.0),
                    interval_secs: 1800,
                },
                BandConfig {
                    label: "HIGH".to_string(),
                    up_to: None,
                    interval_secs: 1200,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTiming {
    pub interval_secs: u64,
    pub recovery_secs: u64,
}

impl WorkerTiming {
    #[must_use]
    pub const fn new(interval_secs: u64, recovery_secs: u64) -> Self {
        Self {
            interval_secs,
            recovery_secs,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub position_review: WorkerTiming,
    pub risk_assessment: WorkerTiming,
    /// `interval_secs` is only used when adaptive cadence is off.
    pub opportunity_discovery: WorkerTiming,
    pub adaptive_discovery: bool,
    pub execution: WorkerTiming,
    pub alert_dispatch: WorkerTiming,
    pub endpoint_health: WorkerTiming,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            position_review: WorkerTiming::new(300, 60),
            risk_assessment: WorkerTiming::new(60, 30),
            opportunity_discovery: WorkerTiming::new(1800, 60),
            adaptive_discovery: true,
            execution: WorkerTiming::new(30, 10),
            alert_dispatch: WorkerTiming::new(5, 10),
            endpoint_health: WorkerTiming::new(300, 60),
        }
    }
}

impl WorkersConfig {
    fn named(&self) -> [(&'static str, WorkerTiming); 6] {
        [
            ("position_review", self.position_review),
            ("risk_assessment", self.risk_assessment),
            ("opportunity_discovery", self.opportunity_discovery),
            ("execution", self.execution),
            ("alert_dispatch", self.alert_dispatch),
            ("endpoint_health", self.endpoint_health),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Http,
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_starting_cash")]
    pub starting_cash: Decimal,
}

const fn default_min_interval_ms() -> u64 {
    1000
}

const fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_starting_cash() -> Decimal {
    Decimal::from(100_000)
}

impl ProviderConfig {
    #[must_use]
    pub fn paper(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ProviderKind::Paper,
            base_url: None,
            api_key_env: None,
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_provider_timeout_secs(),
            starting_cash: default_starting_cash(),
        }
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub primary: String,
    pub failure_threshold: u32,
    pub recovery_successes: u32,
    pub providers: Vec<ProviderConfig>,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            primary: "paper".to_string(),
            failure_threshold: 3,
            recovery_successes: 1,
            providers: vec![ProviderConfig::paper("paper")],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Chat,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub kind: DecisionKind,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            kind: DecisionKind::Fallback,
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

impl DecisionConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub risk_free_rate: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: crate::market::DEFAULT_RISK_FREE_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub confidence: f64,
    pub volume: f64,
    pub spread: f64,
    pub iv: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            volume: 0.2,
            spread: 0.2,
            iv: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerKind {
    Http,
    Watchlist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub kind: ScannerKind,
    /// Screening service URL for the HTTP scanner.
    pub url: Option<String>,
    /// Underlyings for the watchlist scanner, priced against the quote URL.
    pub watchlist: Vec<String>,
    pub quote_url: String,
    pub days_to_expiry: u32,
    /// Volatility used to price watchlist spreads, as a decimal.
    pub assumed_vol: f64,
    pub timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            kind: ScannerKind::Watchlist,
            url: None,
            watchlist: vec!["SPY".to_string(), "QQQ".to_string(), "IWM".to_string()],
            quote_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            days_to_expiry: 35,
            assumed_vol: 0.20,
            timeout_secs: 30,
        }
    }
}

impl ScannerConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub queue_capacity: usize,
    pub min_score: f64,
    pub weights: ScoringWeights,
    pub scanner: ScannerConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            min_score: 0.0,
            weights: ScoringWeights::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_portfolio_delta: f64,
    pub max_portfolio_gamma: f64,
    pub max_portfolio_vega: f64,
    /// Share of positions in one strategy that raises a concentration alert.
    pub strategy_concentration_warning: f64,
    pub buying_power_usage_warning: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_portfolio_delta: 100.0,
            max_portfolio_gamma: 50.0,
            max_portfolio_vega: 200.0,
            strategy_concentration_warning: 0.40,
            buying_power_usage_warning: 0.70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Close when the loss reaches this fraction of max loss.
    pub emergency_loss_pct: f64,
    /// Close when the gain reaches this fraction of max profit.
    pub profit_target_pct: f64,
    /// Close losing positions this many days from expiry.
    pub time_stop_dte: i64,
    /// Positions younger than this are left out of engine review.
    pub min_age_minutes: i64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            emergency_loss_pct: 0.80,
            profit_target_pct: 0.50,
            time_stop_dte: 7,
            min_age_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub per_tick: usize,
    /// Fraction of net liquidation risked per trade before adjustments.
    pub risk_budget_pct: f64,
    /// Cap on total max loss across open positions, as a fraction of net liquidation.
    pub max_allocation_pct: f64,
    pub min_quantity: u32,
    pub max_quantity: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            per_tick: 3,
            risk_budget_pct: 0.01,
            max_allocation_pct: 0.25,
            min_quantity: 1,
            max_quantity: 10,
        }
    }
}

impl AppConfig {
    /// Checks cross-field constraints serde cannot express.
    ///
    /// The cadence band table is validated separately when the scheduler
    /// builds it.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicator;
        ensure!(
            ind.valid_min < ind.valid_max,
            "indicator valid range is empty: [{}, {}]",
            ind.valid_min,
            ind.valid_max
        );
        ensure!(
            (ind.valid_min..=ind.valid_max).contains(&ind.default_value),
            "indicator default {} lies outside [{}, {}]",
            ind.default_value,
            ind.valid_min,
            ind.valid_max
        );
        ensure!(ind.fetch_timeout_secs > 0, "indicator fetch timeout must be positive");

        for (name, timing) in self.workers.named() {
            ensure!(timing.interval_secs > 0, "workers.{name}.interval_secs must be positive");
            ensure!(timing.recovery_secs > 0, "workers.{name}.recovery_secs must be positive");
        }

        let endpoints = &self.endpoints;
        ensure!(!endpoints.providers.is_empty(), "at least one provider is required");
        ensure!(endpoints.failure_threshold > 0, "failure_threshold must be positive");
        ensure!(endpoints.recovery_successes > 0, "recovery_successes must be positive");

        let mut seen = HashSet::new();
        for provider in &endpoints.providers {
            if !seen.insert(provider.id.as_str()) {
                bail!("duplicate provider id: {}", provider.id);
            }
            if provider.kind == ProviderKind::Http && provider.base_url.is_none() {
                bail!("provider {} is http but has no base_url", provider.id);
            }
            ensure!(provider.timeout_secs > 0, "provider {} timeout must be positive", provider.id);
        }
        ensure!(
            seen.contains(endpoints.primary.as_str()),
            "primary provider {} is not configured",
            endpoints.primary
        );

        ensure!(self.discovery.queue_capacity > 0, "discovery.queue_capacity must be positive");
        if self.discovery.scanner.kind == ScannerKind::Http {
            ensure!(
                self.discovery.scanner.url.is_some(),
                "http scanner requires discovery.scanner.url"
            );
        }

        let exec = &self.execution;
        ensure!(
            exec.min_quantity > 0 && exec.min_quantity <= exec.max_quantity,
            "execution quantity bounds are invalid: {}..{}",
            exec.min_quantity,
            exec.max_quantity
        );

        Ok(())
    }
}
