//! TTL cache in front of an external indicator source.
//!
//! [`IndicatorCache::get`] always produces a usable value: a fresh sample,
//! the last good sample (stale), or the configured default.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use optdesk_core::{ExternalError, IndicatorConfig, IndicatorSource};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    pub ttl: Duration,
    pub valid_min: f64,
    pub valid_max: f64,
    pub default_value: f64,
    pub fetch_timeout: Duration,
}

impl From<&IndicatorConfig> for IndicatorSettings {
    fn from(config: &IndicatorConfig) -> Self {
        Self {
            ttl: config.ttl(),
            valid_min: config.valid_min,
            valid_max: config.valid_max,
            default_value: config.default_value,
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self::from(&IndicatorConfig::default())
    }
}

/// One fetched value and whether it passed range validation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSample {
    pub value: f64,
    pub fetched_at: DateTime<Utc>,
    pub valid: bool,
    fetched_instant: Instant,
}

impl IndicatorSample {
    fn validated(value: f64, settings: &IndicatorSettings) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            valid: value.is_finite() && (settings.valid_min..=settings.valid_max).contains(&value),
            fetched_instant: Instant::now(),
        }
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.fetched_instant.elapsed()
    }
}

/// Where a served value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingOrigin {
    /// Cached sample still inside its TTL.
    Cached,
    /// Fetched during this call.
    Fetched,
    /// Last good sample, served because a refresh failed.
    Stale,
    /// No good sample has ever been fetched.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorReading {
    pub value: f64,
    pub is_fresh: bool,
    pub origin: ReadingOrigin,
    pub sampled_at: Option<DateTime<Utc>>,
}

pub struct IndicatorCache {
    source: Arc<dyn IndicatorSource>,
    settings: IndicatorSettings,
    // Held across the fetch so concurrent callers share one refresh.
    slot: Mutex<Option<IndicatorSample>>,
    fetches: AtomicU64,
}

impl IndicatorCache {
    #[must_use]
    pub fn new(source: Arc<dyn IndicatorSource>, settings: IndicatorSettings) -> Self {
        Self {
            source,
            settings,
            slot: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Returns the current indicator value and whether it is fresh.
    pub async fn get(&self) -> IndicatorReading {
        let mut slot = self.slot.lock().await;

        if let Some(sample) = slot.as_ref() {
            if sample.age() < self.settings.ttl {
                return IndicatorReading {
                    value: sample.value,
                    is_fresh: true,
                    origin: ReadingOrigin::Cached,
                    sampled_at: Some(sample.fetched_at),
                };
            }
        }

        match self.fetch().await {
            Ok(sample) => {
                debug!(source = self.source.name(), value = sample.value, "Indicator refreshed");
                let reading = IndicatorReading {
                    value: sample.value,
                    is_fresh: true,
                    origin: ReadingOrigin::Fetched,
                    sampled_at: Some(sample.fetched_at),
                };
                *slot = Some(sample);
                reading
            }
            Err(e) => match slot.as_ref() {
                Some(stale) => {
                    warn!(
                        source = self.source.name(),
                        error = %e,
                        stale_value = stale.value,
                        age_secs = stale.age().as_secs(),
                        "Indicator refresh failed, serving stale value"
                    );
                    IndicatorReading {
                        value: stale.value,
                        is_fresh: false,
                        origin: ReadingOrigin::Stale,
                        sampled_at: Some(stale.fetched_at),
                    }
                }
                None => {
                    warn!(
                        source = self.source.name(),
                        error = %e,
                        default = self.settings.default_value,
                        "Indicator unavailable, serving default"
                    );
                    IndicatorReading {
                        value: self.settings.default_value,
                        is_fresh: false,
                        origin: ReadingOrigin::Default,
                        sampled_at: None,
                    }
                }
            },
        }
    }

    async fn fetch(&self) -> Result<IndicatorSample, ExternalError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let value = tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch_scalar())
            .await
            .map_err(|_| ExternalError::timeout("fetch_scalar", self.settings.fetch_timeout))??;

        let sample = IndicatorSample::validated(value, &self.settings);
        if sample.valid {
            Ok(sample)
        } else {
            Err(ExternalError::invalid_data(format!(
                "indicator value {value} outside [{}, {}]",
                self.settings.valid_min, self.settings.valid_max
            )))
        }
    }

    /// Number of fetch attempts issued to the source so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Last sample that passed validation, if any.
    pub async fn last_sample(&self) -> Option<IndicatorSample> {
        self.slot.lock().await.clone()
    }

    #[must_use]
    pub const fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }
}

impl std::fmt::Debug for IndicatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorCache")
            .field("source", &self.source.name())
            .field("settings", &self.settings)
            .field("fetches", &self.fetch_count())
            .finish_non_exhaustive()
    }
}
