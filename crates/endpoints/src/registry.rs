//! Provider registry with health tracking and failover.
//!
//! A provider is marked unhealthy after `failure_threshold` consecutive
//! failed calls and becomes eligible again after `recovery_successes`
//! consecutive successes (normally from the health-check worker's probes).
//! [`EndpointRegistry::pick_healthy`] prefers the primary, then the remaining
//! providers in configuration order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use optdesk_core::{
    AccountSummary, BrokerEndpoint, EndpointsConfig, ExternalError, ExternalResult, ProviderId,
};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::RateLimitedClient;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Consecutive failures that mark a provider unhealthy.
    pub failure_threshold: u32,
    /// Consecutive successes that bring an unhealthy provider back.
    pub recovery_successes: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_successes: 1,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_recovery_successes(mut self, successes: u32) -> Self {
        self.recovery_successes = successes;
        self
    }
}

impl From<&EndpointsConfig> for RegistryConfig {
    fn from(config: &EndpointsConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            recovery_successes: config.recovery_successes,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry has no providers")]
    Empty,

    #[error("duplicate provider: {0}")]
    DuplicateProvider(ProviderId),

    #[error("unknown provider: {0}")]
    UnknownProvider(ProviderId),
}

// =============================================================================
// Health records
// =============================================================================

#[derive(Debug, Clone)]
struct HealthRecord {
    healthy: bool,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_checked: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl HealthRecord {
    const fn new() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_checked: None,
            last_error: None,
        }
    }
}

/// Point-in-time view of one provider's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider: ProviderId,
    pub is_primary: bool,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Result of a call routed by the registry, tagged with the provider used.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed<T> {
    pub provider: ProviderId,
    pub value: T,
}

// =============================================================================
// Registry
// =============================================================================

pub struct EndpointRegistry {
    order: Vec<ProviderId>,
    clients: HashMap<ProviderId, Arc<RateLimitedClient>>,
    primary: RwLock<ProviderId>,
    health: RwLock<HashMap<ProviderId, HealthRecord>>,
    config: RegistryConfig,
}

impl EndpointRegistry {
    /// Builds a registry from clients in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if `clients` is empty, contains duplicate
    /// provider ids, or does not contain `primary`.
    pub fn new(
        clients: Vec<RateLimitedClient>,
        primary: ProviderId,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        if clients.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut order = Vec::with_capacity(clients.len());
        let mut by_id = HashMap::with_capacity(clients.len());
        let mut health = HashMap::with_capacity(clients.len());
        for client in clients {
            let id = client.provider().clone();
            if by_id.contains_key(&id) {
                return Err(RegistryError::DuplicateProvider(id));
            }
            order.push(id.clone());
            health.insert(id.clone(), HealthRecord::new());
            by_id.insert(id, Arc::new(client));
        }

        if !by_id.contains_key(&primary) {
            return Err(RegistryError::UnknownProvider(primary));
        }

        Ok(Self {
            order,
            clients: by_id,
            primary: RwLock::new(primary),
            health: RwLock::new(health),
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Provider ids in configuration order.
    #[must_use]
    pub fn providers(&self) -> &[ProviderId] {
        &self.order
    }

    #[must_use]
    pub fn primary(&self) -> ProviderId {
        self.primary.read().clone()
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProvider`] if `provider` is not registered.
    pub fn set_primary(&self, provider: &ProviderId) -> Result<(), RegistryError> {
        if !self.clients.contains_key(provider) {
            return Err(RegistryError::UnknownProvider(provider.clone()));
        }
        let previous = std::mem::replace(&mut *self.primary.write(), provider.clone());
        if previous != *provider {
            info!(from = %previous, to = %provider, "Primary provider changed");
        }
        Ok(())
    }

    #[must_use]
    pub fn client(&self, provider: &ProviderId) -> Option<Arc<RateLimitedClient>> {
        self.clients.get(provider).cloned()
    }

    #[must_use]
    pub fn is_healthy(&self, provider: &ProviderId) -> bool {
        self.health.read().get(provider).is_some_and(|h| h.healthy)
    }

    /// Chooses the provider for the next call: the primary if healthy,
    /// otherwise the first healthy provider in configuration order.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalError::NoHealthyProvider`] if every provider is
    /// marked unhealthy.
    pub fn pick_healthy(&self) -> ExternalResult<ProviderId> {
        let primary = self.primary();
        let health = self.health.read();
        let healthy = |id: &ProviderId| health.get(id).is_some_and(|h| h.healthy);

        if healthy(&primary) {
            return Ok(primary);
        }
        self.order
            .iter()
            .find(|id| healthy(id))
            .cloned()
            .ok_or(ExternalError::NoHealthyProvider)
    }

    /// Records a call outcome and updates health.
    pub fn record_outcome(&self, provider: &ProviderId, ok: bool) {
        self.record(provider, ok, None);
    }

    /// Records the result of a call, classifying errors that do not reflect
    /// on provider health as successes.
    pub fn record_result<T>(&self, provider: &ProviderId, result: &ExternalResult<T>) {
        match result {
            Ok(_) => self.record(provider, true, None),
            Err(e) if e.counts_against_health() => self.record(provider, false, Some(e.to_string())),
            Err(e) => {
                debug!(provider = %provider, error = %e, "Provider answered with a non-health error");
                self.record(provider, true, None);
            }
        }
    }

    fn record(&self, provider: &ProviderId, ok: bool, error: Option<String>) {
        let mut health = self.health.write();
        let Some(record) = health.get_mut(provider) else {
            warn!(provider = %provider, "Outcome recorded for unknown provider");
            return;
        };
        record.last_checked = Some(Utc::now());

        if ok {
            record.consecutive_failures = 0;
            record.consecutive_successes = record.consecutive_successes.saturating_add(1);
            if !record.healthy && record.consecutive_successes >= self.config.recovery_successes {
                record.healthy = true;
                record.last_error = None;
                info!(provider = %provider, "Provider recovered");
            }
        } else {
            record.consecutive_successes = 0;
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            if error.is_some() {
                record.last_error = error;
            }
            if record.healthy && record.consecutive_failures >= self.config.failure_threshold {
                record.healthy = false;
                warn!(
                    provider = %provider,
                    failures = record.consecutive_failures,
                    last_error = record.last_error.as_deref().unwrap_or(""),
                    "Provider marked unhealthy"
                );
            }
        }
    }

    /// Runs `f` on the best healthy provider and records the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalError::NoHealthyProvider`] without calling anything
    /// if no provider is healthy, otherwise the call's own error.
    pub async fn execute<T, F, Fut>(&self, operation: &'static str, f: F) -> ExternalResult<Routed<T>>
    where
        F: FnOnce(Arc<dyn BrokerEndpoint>) -> Fut,
        Fut: Future<Output = ExternalResult<T>>,
    {
        let provider = self.pick_healthy()?;
        let value = self.call_on(&provider, operation, f).await?;
        Ok(Routed { provider, value })
    }

    /// Runs `f` on a specific provider, which must be healthy, and records
    /// the outcome. Used for calls that must reach the provider owning a
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalError::NoHealthyProvider`] if `provider` is unknown
    /// or unhealthy, otherwise the call's own error.
    pub async fn execute_on<T, F, Fut>(
        &self,
        provider: &ProviderId,
        operation: &'static str,
        f: F,
    ) -> ExternalResult<T>
    where
        F: FnOnce(Arc<dyn BrokerEndpoint>) -> Fut,
        Fut: Future<Output = ExternalResult<T>>,
    {
        if !self.is_healthy(provider) {
            return Err(ExternalError::NoHealthyProvider);
        }
        self.call_on(provider, operation, f).await
    }

    async fn call_on<T, F, Fut>(
        &self,
        provider: &ProviderId,
        operation: &'static str,
        f: F,
    ) -> ExternalResult<T>
    where
        F: FnOnce(Arc<dyn BrokerEndpoint>) -> Fut,
        Fut: Future<Output = ExternalResult<T>>,
    {
        let client = self
            .clients
            .get(provider)
            .ok_or(ExternalError::NoHealthyProvider)?;
        let result = client.call(operation, f).await;
        self.record_result(provider, &result);
        result
    }

    /// Calls `get_account` on `provider` regardless of its health and
    /// records the outcome.
    ///
    /// # Errors
    ///
    /// Returns the probe's error, or [`ExternalError::NoHealthyProvider`] if
    /// `provider` is not registered.
    pub async fn probe(&self, provider: &ProviderId) -> ExternalResult<AccountSummary> {
        self.call_on(provider, "probe", |ep| async move { ep.get_account().await })
            .await
    }

    /// Probes every unhealthy provider once. Returns each probed provider and
    /// whether it is healthy afterwards.
    pub async fn probe_unhealthy(&self) -> Vec<(ProviderId, bool)> {
        let unhealthy: Vec<ProviderId> = self
            .order
            .iter()
            .filter(|id| !self.is_healthy(id))
            .cloned()
            .collect();

        let mut results = Vec::with_capacity(unhealthy.len());
        for provider in unhealthy {
            if let Err(e) = self.probe(&provider).await {
                debug!(provider = %provider, error = %e, "Probe failed");
            }
            let healthy = self.is_healthy(&provider);
            results.push((provider, healthy));
        }
        results
    }

    /// Health of every provider in configuration order.
    #[must_use]
    pub fn health_snapshot(&self) -> Vec<ProviderHealth> {
        let primary = self.primary();
        let health = self.health.read();
        self.order
            .iter()
            .filter_map(|id| {
                health.get(id).map(|record| ProviderHealth {
                    provider: id.clone(),
                    is_primary: *id == primary,
                    healthy: record.healthy,
                    consecutive_failures: record.consecutive_failures,
                    consecutive_successes: record.consecutive_successes,
                    last_checked: record.last_checked,
                    last_error: record.last_error.clone(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("providers", &self.order)
            .field("primary", &self.primary())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
