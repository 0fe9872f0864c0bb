use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use optdesk_endpoints::EndpointRegistry;
use optdesk_scheduler::{TickOutcome, WorkUnit};
use tracing::{info, warn};

/// Probes unhealthy providers so they can recover, then reports the
/// account on the provider currently in use.
pub struct EndpointHealth {
    registry: Arc<EndpointRegistry>,
}

impl EndpointHealth {
    #[must_use]
    pub const fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WorkUnit for EndpointHealth {
    fn name(&self) -> &str {
        "endpoint_health"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        for (provider, healthy) in self.registry.probe_unhealthy().await {
            if healthy {
                info!(provider = %provider, "Probe restored provider");
            } else {
                warn!(provider = %provider, "Provider still unhealthy after probe");
            }
        }

        let provider = match self.registry.pick_healthy() {
            Ok(provider) => provider,
            Err(e) => return Ok(TickOutcome::Skipped(e.to_string())),
        };
        let account = self
            .registry
            .execute_on(&provider, "get_account", |ep| async move { ep.get_account().await })
            .await
            .with_context(|| format!("account summary from {provider}"))?;

        info!(
            provider = %provider,
            primary = provider == self.registry.primary(),
            account = %account.account_id,
            cash = %account.cash,
            buying_power = %account.buying_power,
            net_liquidation = %account.net_liquidation,
            "Account summary"
        );
        Ok(TickOutcome::Completed)
    }
}
