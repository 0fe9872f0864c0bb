//! Broker endpoints for the options desk.
//!
//! - [`RateLimitedClient`]: minimum call spacing and timeouts per provider
//! - [`EndpointRegistry`]: health tracking, failover and probing
//! - [`HttpBroker`]: REST endpoint
//! - [`PaperBroker`]: in-memory simulated account

pub mod client;
pub mod http;
pub mod paper;
pub mod registry;

use std::sync::Arc;

use optdesk_core::{BrokerEndpoint, EndpointsConfig, ProviderId, ProviderKind};

pub use client::{ClientLimits, RateLimitedClient};
pub use http::{handle_response, map_reqwest_error, HttpBroker};
pub use paper::PaperBroker;
pub use registry::{EndpointRegistry, ProviderHealth, RegistryConfig, RegistryError, Routed};

/// Builds the registry described by the endpoints config section.
///
/// # Errors
///
/// Returns an error if an HTTP provider cannot be constructed or the
/// provider list is inconsistent.
pub fn build_registry(config: &EndpointsConfig) -> anyhow::Result<EndpointRegistry> {
    let mut clients = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let endpoint: Arc<dyn BrokerEndpoint> = match provider.kind {
            ProviderKind::Http => Arc::new(HttpBroker::from_config(provider)?),
            ProviderKind::Paper => Arc::new(PaperBroker::new(provider.id.clone(), provider.starting_cash)),
        };
        clients.push(RateLimitedClient::new(
            ProviderId::new(provider.id.clone()),
            endpoint,
            ClientLimits::from(provider),
        ));
    }
    Ok(EndpointRegistry::new(
        clients,
        ProviderId::new(config.primary.clone()),
        RegistryConfig::from(config),
    )?)
}
