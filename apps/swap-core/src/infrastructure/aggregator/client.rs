//! HTTP client adapter for the cross-chain exchange aggregator.
//!
//! Grounded on `infrastructure::broker::alpaca::http_client::AlpacaHttpClient`:
//! same request/retry/error-categorization shape, re-pointed at the
//! aggregator's REST API and producing `AggregatorError` directly rather
//! than an intermediate broker-specific error type, since `AggregatorPort`
//! is this crate's only abstraction boundary for the aggregator.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{AggregatorError, AggregatorPort, CreatedOrder, Quote, StatusSnapshot};
use crate::domain::shared::{Amount, AssetSymbol, ExternalOrderId, Network, QuoteId};

use super::api_types::{
    AggregatorErrorResponse, CreateOrderRequest, CreateOrderResponseWire, OrderStatusResponseWire,
    QuoteRequest, QuoteResponseWire,
};
use super::config::AggregatorConfig;
use super::retry::{categorize_status, ErrorCategory, ExponentialBackoffCalculator};

/// HTTP adapter implementing `AggregatorPort` against the aggregator's REST API.
#[derive(Debug, Clone)]
pub struct HttpAggregatorClient {
    client: Client,
    base_url: String,
    api_key: String,
    affiliate_id: Option<String>,
    config: AggregatorConfig,
}

impl HttpAggregatorClient {
    /// Build a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Transient` if the underlying HTTP client
    /// cannot be constructed (e.g. TLS backend init failure).
    pub fn new(config: AggregatorConfig) -> Result<Self, AggregatorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AggregatorError::Transient {
                http_status: None,
                message: format!("failed to build http client: {e}"),
                retry_after: None,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            affiliate_id: config.affiliate_id.clone(),
            config,
        })
    }

    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, AggregatorError> {
        let url = format!("{}{path}", self.base_url);
        let mut backoff = ExponentialBackoffCalculator::new(&self.config.retry);

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X-Api-Key", &self.api_key);
            if let Some(b) = body {
                request = request.json(b);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(error = %e, attempt = backoff.current_attempt(), "aggregator request failed, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AggregatorError::Transient {
                        http_status: None,
                        message: e.to_string(),
                        retry_after: None,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response
                    .text()
                    .await
                    .map_err(|e| AggregatorError::InvalidResponse(e.to_string()))?;
                return serde_json::from_str(&text)
                    .map_err(|e| AggregatorError::InvalidResponse(format!("{e}: {text}")));
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            let body_text = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<AggregatorErrorResponse>(&body_text) {
                Ok(err) => (err.code.unwrap_or_else(|| status.as_u16().to_string()), err.message),
                Err(_) => (status.as_u16().to_string(), body_text),
            };

            match categorize_status(status.as_u16()) {
                ErrorCategory::RateLimited => {
                    if let Some(delay) = retry_after.map(std::time::Duration::from_secs).or_else(|| backoff.next_backoff()) {
                        tracing::warn!(code = %code, delay_secs = delay.as_secs(), "aggregator rate limited, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AggregatorError::Transient {
                        http_status: Some(status.as_u16()),
                        message,
                        retry_after,
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(code = %code, delay_ms = delay.as_millis(), "aggregator returned retryable error");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AggregatorError::Transient {
                        http_status: Some(status.as_u16()),
                        message,
                        retry_after,
                    });
                }
                ErrorCategory::NonRetryable => {
                    return Err(AggregatorError::Permanent { code, message });
                }
            }
        }
    }
}

#[async_trait]
impl AggregatorPort for HttpAggregatorClient {
    async fn get_quote(
        &self,
        from_asset: &AssetSymbol,
        from_network: &Network,
        to_asset: &AssetSymbol,
        to_network: &Network,
        amount: Amount,
    ) -> Result<Quote, AggregatorError> {
        let body = QuoteRequest {
            deposit_coin: from_asset.as_str(),
            deposit_network: from_network.as_str(),
            settle_coin: to_asset.as_str(),
            settle_network: to_network.as_str(),
            deposit_amount: amount.to_string(),
            affiliate_id: self.affiliate_id.as_deref(),
        };
        let wire: QuoteResponseWire = self
            .request(reqwest::Method::POST, "/v2/quotes", Some(&body))
            .await?;
        wire.validate()
    }

    async fn create_order(
        &self,
        quote_id: &QuoteId,
        settle_address: &str,
        refund_address: &str,
    ) -> Result<CreatedOrder, AggregatorError> {
        let body = CreateOrderRequest {
            quote_id: quote_id.as_str(),
            settle_address,
            refund_address,
        };
        let wire: CreateOrderResponseWire = self
            .request(reqwest::Method::POST, "/v2/orders", Some(&body))
            .await?;
        wire.validate()
    }

    async fn get_order_status(&self, order_id: &ExternalOrderId) -> Result<StatusSnapshot, AggregatorError> {
        let path = format!("/v2/orders/{}", order_id.as_str());
        let wire: OrderStatusResponseWire = self
            .request::<_, ()>(reqwest::Method::GET, &path, None)
            .await?;
        wire.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let config = AggregatorConfig::new("https://api.example/".into(), "key".into());
        let client = HttpAggregatorClient::new(config).unwrap();
        assert_eq!(client.base_url, "https://api.example");
    }
}
