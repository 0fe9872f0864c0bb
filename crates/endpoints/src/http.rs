//! REST broker endpoint.
//!
//! Speaks a small JSON protocol:
//!
//! | Method | Path         | Body           | Response              |
//! |--------|--------------|----------------|-----------------------|
//! | GET    | `/positions` |                | `[BrokerPosition]`    |
//! | GET    | `/account`   |                | `AccountSummary`      |
//! | POST   | `/orders`    | `OrderRequest` | `OrderResult`         |
//!
//! Requests carry a bearer token when an API key is configured.

use std::time::Duration;

use async_trait::async_trait;
use optdesk_core::{
    AccountSummary, BrokerEndpoint, BrokerPosition, ExternalError, ExternalResult, OrderRequest,
    OrderResult, ProviderConfig,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Retry-After default when a 429 carries no header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub struct HttpBroker {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpBroker {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Builds a broker from provider config, reading the API key from the
    /// named environment variable when one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider has no base URL, the key variable is
    /// named but unset, or the HTTP client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider {} has no base_url", config.id))?;
        let api_key = match &config.api_key_env {
            Some(var) => Some(SecretString::from(std::env::var(var).map_err(|_| {
                anyhow::anyhow!("environment variable {var} for provider {} is not set", config.id)
            })?)),
            None => None,
        };
        Self::new(base_url, api_key, config.timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ExternalResult<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "GET");
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ExternalResult<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "POST");
        let response = self
            .authorized(self.http.post(&url).json(body))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        handle_response(response).await
    }
}

/// Maps a status/body pair onto the external error taxonomy and decodes
/// successful bodies.
///
/// # Errors
///
/// 429 becomes [`ExternalError::RateLimited`], 422 [`ExternalError::Rejected`],
/// 401 and 403 [`ExternalError::Unauthorized`], any other non-success
/// [`ExternalError::Upstream`], and an undecodable body
/// [`ExternalError::InvalidData`].
pub async fn handle_response<T: DeserializeOwned>(response: Response) -> ExternalResult<T> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ExternalError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if status == StatusCode::UNPROCESSABLE_ENTITY {
        let text = response.text().await.unwrap_or_default();
        return Err(ExternalError::Rejected(text));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let text = response.text().await.unwrap_or_default();
        return Err(ExternalError::Unauthorized(format!("{status}: {text}")));
    }

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ExternalError::upstream(status.as_u16(), text));
    }

    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|e| ExternalError::invalid_data(e.to_string()))
}

/// Classifies a reqwest failure. Client-level timeouts are reported as
/// transport errors; callers that own a deadline report [`ExternalError::Timeout`].
pub fn map_reqwest_error(err: reqwest::Error) -> ExternalError {
    if err.is_decode() {
        ExternalError::invalid_data(err.to_string())
    } else if let Some(status) = err.status() {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ExternalError::Unauthorized(err.to_string())
        } else {
            ExternalError::upstream(status.as_u16(), err.to_string())
        }
    } else {
        ExternalError::Transport(err.to_string())
    }
}

#[async_trait]
impl BrokerEndpoint for HttpBroker {
    async fn get_positions(&self) -> ExternalResult<Vec<BrokerPosition>> {
        self.get("/positions").await
    }

    async fn get_account(&self) -> ExternalResult<AccountSummary> {
        self.get("/account").await
    }

    async fn submit_order(&self, order: OrderRequest) -> ExternalResult<OrderResult> {
        self.post("/orders", &order).await
    }
}

impl std::fmt::Debug for HttpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBroker")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}
