use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::cadence::CadenceController;
use crate::indicator::{IndicatorCache, IndicatorReading};

/// Outcome of one scheduling decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CadenceDecision {
    pub reading: IndicatorReading,
    pub band: String,
    pub interval: Duration,
}

/// Indicator cache plus band table: decides the next sleep for a worker.
#[derive(Debug)]
pub struct AdaptiveCadence {
    cache: IndicatorCache,
    controller: CadenceController,
    last: Mutex<Option<CadenceDecision>>,
}

impl AdaptiveCadence {
    #[must_use]
    pub fn new(cache: IndicatorCache, controller: CadenceController) -> Self {
        Self {
            cache,
            controller,
            last: Mutex::new(None),
        }
    }

    /// Reads the indicator once and maps it to an interval.
    pub async fn decide(&self) -> CadenceDecision {
        let reading = self.cache.get().await;
        let band = self.controller.band_for(reading.value);
        let decision = CadenceDecision {
            reading,
            band: band.label.clone(),
            interval: band.interval,
        };

        let previous = self.last.lock().replace(decision.clone());
        if previous.as_ref().map(|p| p.band.as_str()) != Some(decision.band.as_str()) {
            info!(
                value = reading.value,
                fresh = reading.is_fresh,
                regime = %decision.band,
                interval_mins = decision.interval.as_secs() / 60,
                "Cadence regime changed"
            );
        }
        decision
    }

    /// Most recent decision, if one has been made.
    #[must_use]
    pub fn last_decision(&self) -> Option<CadenceDecision> {
        self.last.lock().clone()
    }

    #[must_use]
    pub const fn cache(&self) -> &IndicatorCache {
        &self.cache
    }

    #[must_use]
    pub const fn controller(&self) -> &CadenceController {
        &self.controller
    }
}

/// How a worker decides how long to sleep after a successful tick.
#[derive(Debug, Clone)]
pub enum IntervalSource {
    Fixed(Duration),
    Adaptive(Arc<AdaptiveCadence>),
}

impl IntervalSource {
    /// Interval for the upcoming sleep. Evaluated once per tick, before the
    /// tick runs, so a regime change only affects the next wake-up.
    pub async fn next_interval(&self) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Adaptive(cadence) => cadence.decide().await.interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceTable;
    use crate::indicator::IndicatorSettings;
    use async_trait::async_trait;
    use optdesk_core::{CadenceConfig, ExternalResult, IndicatorSource};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;

    struct Sequence(SyncMutex<VecDeque<f64>>);

    #[async_trait]
    impl IndicatorSource for Sequence {
        async fn fetch_scalar(&self) -> ExternalResult<f64> {
            let mut values = self.0.lock();
            let value = if values.len() > 1 {
                values.pop_front()
            } else {
                values.front().copied()
            };
            value.ok_or_else(|| optdesk_core::ExternalError::invalid_data("empty"))
        }

        fn name(&self) -> &str {
            "sequence"
        }
    }

    fn adaptive(values: Vec<f64>, ttl: Duration) -> AdaptiveCadence {
        let source = Arc::new(Sequence(SyncMutex::new(values.into())));
        let settings = IndicatorSettings {
            ttl,
            ..IndicatorSettings::default()
        };
        AdaptiveCadence::new(
            IndicatorCache::new(source, settings),
            CadenceController::new(CadenceTable::from_config(&CadenceConfig::default()).unwrap()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_regime_sequence_through_cache() {
        let cadence = adaptive(vec![17.0, 23.0, 28.0], Duration::ZERO);
        let mut minutes = Vec::new();
        for _ in 0..3 {
            minutes.push(cadence.decide().await.interval.as_secs() / 60);
        }
        assert_eq!(minutes, vec![60, 30, 20]);
        assert_eq!(cadence.last_decision().unwrap().band, "HIGH");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_source_ignores_indicator() {
        let source = IntervalSource::Fixed(Duration::from_secs(300));
        assert_eq!(source.next_interval().await, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_value_holds_regime_until_ttl() {
        let cadence = Arc::new(adaptive(vec![17.0, 28.0], Duration::from_secs(300)));
        let source = IntervalSource::Adaptive(Arc::clone(&cadence));

        assert_eq!(source.next_interval().await, Duration::from_secs(3600));
        assert_eq!(source.next_interval().await, Duration::from_secs(3600));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(source.next_interval().await, Duration::from_secs(1200));
        assert_eq!(cadence.cache().fetch_count(), 2);
    }
}
