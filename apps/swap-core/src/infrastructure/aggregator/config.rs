//! Aggregator HTTP client configuration (spec §6, `aggregator.*` keys).

use std::time::Duration;

use super::retry::AggregatorRetryPolicy;

/// Configuration for the aggregator HTTP client.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// `aggregator.baseUrl` — the aggregator's REST API base URL.
    pub base_url: String,
    /// `aggregator.apiKey` — server-side-only auth secret.
    pub api_key: String,
    /// `aggregator.affiliateId` — attribution tag sent on every request.
    pub affiliate_id: Option<String>,
    /// Per-request timeout (spec §5: default 20s).
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: AggregatorRetryPolicy,
}

impl AggregatorConfig {
    /// Create a new configuration with spec-default timeout and retry policy.
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            affiliate_id: None,
            timeout: Duration::from_secs(20),
            retry: AggregatorRetryPolicy::default(),
        }
    }

    /// Attach an affiliate ID for attribution.
    #[must_use]
    pub fn with_affiliate_id(mut self, affiliate_id: impl Into<String>) -> Self {
        self.affiliate_id = Some(affiliate_id.into());
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_twenty_seconds() {
        let config = AggregatorConfig::new("https://api.example".into(), "key".into());
        assert_eq!(config.timeout, Duration::from_secs(20));
    }

    #[test]
    fn with_affiliate_id_sets_it() {
        let config = AggregatorConfig::new("https://api.example".into(), "key".into())
            .with_affiliate_id("aff-1");
        assert_eq!(config.affiliate_id.as_deref(), Some("aff-1"));
    }
}
