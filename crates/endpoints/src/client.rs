//! Per-provider rate limiting and call timeouts.
//!
//! Every broker call goes through a [`RateLimitedClient`], which enforces a
//! minimum spacing between consecutive calls to the same provider and bounds
//! each call with a timeout.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use optdesk_core::{
    AccountSummary, BrokerEndpoint, BrokerPosition, ExternalError, ExternalResult, OrderRequest,
    OrderResult, ProviderConfig, ProviderId,
};
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

// =============================================================================
// Limits
// =============================================================================

/// Spacing and timeout applied to one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientLimits {
    /// Minimum time between the starts of two consecutive calls.
    pub min_interval: Duration,
    /// Upper bound on a single call.
    pub timeout: Duration,
}

impl Default for ClientLimits {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientLimits {
    #[must_use]
    pub const fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl From<&ProviderConfig> for ClientLimits {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            min_interval: config.min_interval(),
            timeout: config.timeout(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Wraps one broker endpoint with spacing and timeout enforcement.
pub struct RateLimitedClient {
    provider: ProviderId,
    endpoint: Arc<dyn BrokerEndpoint>,
    // None when min_interval is zero.
    limiter: Option<DirectLimiter>,
    limits: ClientLimits,
    calls: AtomicU64,
}

impl RateLimitedClient {
    #[must_use]
    pub fn new(provider: ProviderId, endpoint: Arc<dyn BrokerEndpoint>, limits: ClientLimits) -> Self {
        let limiter = Quota::with_period(limits.min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(nonzero!(1u32))));
        Self {
            provider,
            endpoint,
            limiter,
            limits,
            calls: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn provider(&self) -> &ProviderId {
        &self.provider
    }

    #[must_use]
    pub const fn limits(&self) -> ClientLimits {
        self.limits
    }

    /// Number of calls issued through this client.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Waits for the rate limiter, then runs `f` against the endpoint under
    /// the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or [`ExternalError::Timeout`] if it does
    /// not finish in time.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> ExternalResult<T>
    where
        F: FnOnce(Arc<dyn BrokerEndpoint>) -> Fut,
        Fut: Future<Output = ExternalResult<T>>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        debug!(provider = %self.provider, operation, "Calling provider");

        match tokio::time::timeout(self.limits.timeout, f(Arc::clone(&self.endpoint))).await {
            Ok(result) => result,
            Err(_) => Err(ExternalError::timeout(
                format!("{}.{operation}", self.provider),
                self.limits.timeout,
            )),
        }
    }

    /// # Errors
    ///
    /// See [`RateLimitedClient::call`].
    pub async fn get_positions(&self) -> ExternalResult<Vec<BrokerPosition>> {
        self.call("get_positions", |ep| async move { ep.get_positions().await })
            .await
    }

    /// # Errors
    ///
    /// See [`RateLimitedClient::call`].
    pub async fn get_account(&self) -> ExternalResult<AccountSummary> {
        self.call("get_account", |ep| async move { ep.get_account().await })
            .await
    }

    /// # Errors
    ///
    /// See [`RateLimitedClient::call`].
    pub async fn submit_order(&self, order: OrderRequest) -> ExternalResult<OrderResult> {
        self.call("submit_order", |ep| async move { ep.submit_order(order).await })
            .await
    }
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("provider", &self.provider)
            .field("limits", &self.limits)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::time::Instant;

    struct SlowAccount {
        delay: Duration,
    }

    #[async_trait]
    impl BrokerEndpoint for SlowAccount {
        async fn get_positions(&self) -> ExternalResult<Vec<BrokerPosition>> {
            Ok(Vec::new())
        }

        async fn get_account(&self) -> ExternalResult<AccountSummary> {
            tokio::time::sleep(self.delay).await;
            Ok(AccountSummary {
                account_id: "acct".to_string(),
                cash: Decimal::ZERO,
                buying_power: Decimal::ZERO,
                net_liquidation: Decimal::ZERO,
            })
        }

        async fn submit_order(&self, _order: OrderRequest) -> ExternalResult<OrderResult> {
            Err(ExternalError::Rejected("read only".into()))
        }
    }

    fn client(min_interval: Duration, timeout: Duration, delay: Duration) -> RateLimitedClient {
        RateLimitedClient::new(
            ProviderId::new("test"),
            Arc::new(SlowAccount { delay }),
            ClientLimits::default()
                .with_min_interval(min_interval)
                .with_timeout(timeout),
        )
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let client = client(Duration::from_millis(100), Duration::from_secs(5), Duration::ZERO);

        let started = Instant::now();
        for _ in 0..4 {
            client.get_positions().await.unwrap();
        }

        // four calls need at least three full intervals
        assert!(started.elapsed() >= Duration::from_millis(290));
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_limiter() {
        let client = client(Duration::ZERO, Duration::from_secs(5), Duration::ZERO);
        let started = Instant::now();
        for _ in 0..20 {
            client.get_positions().await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_external_error() {
        let client = client(Duration::ZERO, Duration::from_secs(2), Duration::from_secs(30));

        let err = client.get_account().await.unwrap_err();
        match err {
            ExternalError::Timeout { operation, after } => {
                assert_eq!(operation, "test.get_account");
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_endpoint_errors_pass_through() {
        let client = client(Duration::ZERO, Duration::from_secs(5), Duration::ZERO);
        let order = OrderRequest {
            client_order_id: "o-1".to_string(),
            symbol: "SPY".to_string(),
            strategy: optdesk_core::StrategyTag::PutCreditSpread,
            legs: Vec::new(),
            quantity: 1,
            limit_price: Decimal::ONE,
            intent: optdesk_core::OrderIntent::Open,
            position_id: None,
        };
        assert_eq!(
            client.submit_order(order).await.unwrap_err(),
            ExternalError::Rejected("read only".into())
        );
    }
}
