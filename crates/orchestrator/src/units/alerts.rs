use std::sync::Arc;

use async_trait::async_trait;
use optdesk_core::{AlertSeverity, RiskAlert, SharedState};
use optdesk_scheduler::{TickOutcome, WorkUnit};
use tracing::{error, info, warn};

/// Drains risk alerts and writes each to the log at a level matching its
/// severity.
pub struct AlertDispatch {
    state: Arc<SharedState>,
}

impl AlertDispatch {
    #[must_use]
    pub const fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }
}

fn dispatch(alert: &RiskAlert) {
    match alert.severity {
        AlertSeverity::Critical => error!(
            metric = %alert.metric,
            value = alert.value,
            threshold = alert.threshold,
            raised_at = %alert.raised_at,
            "CRITICAL: {}",
            alert.message
        ),
        AlertSeverity::Warning => warn!(
            metric = %alert.metric,
            value = alert.value,
            threshold = alert.threshold,
            "{}",
            alert.message
        ),
        AlertSeverity::Caution | AlertSeverity::Info => info!(
            severity = %alert.severity,
            metric = %alert.metric,
            value = alert.value,
            "{}",
            alert.message
        ),
    }
}

#[async_trait]
impl WorkUnit for AlertDispatch {
    fn name(&self) -> &str {
        "alert_dispatch"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        let alerts = self.state.drain_alerts();
        if alerts.is_empty() {
            return Ok(TickOutcome::Skipped("no alerts".to_string()));
        }
        for alert in &alerts {
            dispatch(alert);
        }
        Ok(TickOutcome::Completed)
    }
}
