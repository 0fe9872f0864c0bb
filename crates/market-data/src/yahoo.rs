//! Yahoo Finance chart endpoint: last traded price for a symbol.

use std::time::Duration;

use async_trait::async_trait;
use optdesk_core::{ExternalError, ExternalResult, IndicatorConfig, IndicatorSource};
use optdesk_endpoints::{handle_response, map_reqwest_error};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

// =============================================================================
// Client
// =============================================================================

/// Fetches last prices from a chart endpoint of the form `{base}/{symbol}`.
#[derive(Debug, Clone)]
pub struct QuoteClient {
    http: Client,
    base_url: String,
}

impl QuoteClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("optdesk/0.1")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &str) -> ExternalResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ExternalError::invalid_data(format!("bad quote url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ExternalError::invalid_data(format!("quote url {} cannot take a path", self.base_url)))?
            .push(symbol);
        url.query_pairs_mut()
            .append_pair("interval", "1d")
            .append_pair("range", "1d");
        Ok(url)
    }

    /// Last regular-session price for `symbol`.
    ///
    /// # Errors
    ///
    /// Transport and status failures map through the shared HTTP taxonomy; a
    /// body without a price is [`ExternalError::InvalidData`].
    pub async fn last_price(&self, symbol: &str) -> ExternalResult<f64> {
        let url = self.chart_url(symbol)?;
        debug!(symbol, url = %url, "Fetching quote");
        let response = self.http.get(url).send().await.map_err(map_reqwest_error)?;
        let body: ChartResponse = handle_response(response).await?;

        if let Some(error) = body.chart.error {
            return Err(ExternalError::invalid_data(format!(
                "{symbol}: {} {}",
                error.code, error.description
            )));
        }
        body.chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.meta.regular_market_price)
            .filter(|price| price.is_finite())
            .ok_or_else(|| ExternalError::invalid_data(format!("{symbol}: no regularMarketPrice")))
    }
}

// =============================================================================
// Indicator source
// =============================================================================

/// Volatility index level read from the quote endpoint.
#[derive(Debug, Clone)]
pub struct QuoteIndicatorSource {
    client: QuoteClient,
    symbol: String,
}

impl QuoteIndicatorSource {
    #[must_use]
    pub fn new(client: QuoteClient, symbol: impl Into<String>) -> Self {
        Self {
            client,
            symbol: symbol.into(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &IndicatorConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            QuoteClient::new(&config.url, config.fetch_timeout())?,
            &config.symbol,
        ))
    }
}

#[async_trait]
impl IndicatorSource for QuoteIndicatorSource {
    async fn fetch_scalar(&self) -> ExternalResult<f64> {
        self.client.last_price(&self.symbol).await
    }

    fn name(&self) -> &str {
        &self.symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_url_appends_symbol_segment() {
        let client = QuoteClient::new(
            "https://query1.finance.yahoo.com/v8/finance/chart/",
            Duration::from_secs(1),
        )
        .unwrap();
        let url = client.chart_url("SPY").unwrap();
        assert_eq!(
            url.as_str(),
            "https://query1.finance.yahoo.com/v8/finance/chart/SPY?interval=1d&range=1d"
        );

        let url = client.chart_url("a/b").unwrap();
        assert!(url.path().ends_with("/chart/a%2Fb"));
    }

    #[test]
    fn test_meta_parsing() {
        let body: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{"meta":{"symbol":"^VIX","regularMarketPrice":17.43}}],"error":null}}"#,
        )
        .unwrap();
        let price = body.chart.result.unwrap()[0].meta.regular_market_price;
        assert_eq!(price, Some(17.43));
    }
}
