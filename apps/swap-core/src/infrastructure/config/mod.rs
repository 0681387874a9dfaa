//! Layered configuration for the swap orchestration core (spec §6,
//! "Environment and configuration").
//!
//! Grounded on `config::load_config`/`interpolate_env_vars`/`validate_config`:
//! a YAML file with `${VAR}`/`${VAR:-default}` interpolation, parsed into a
//! root struct assembled from one sub-struct per concern, then validated.

use std::sync::OnceLock;
use std::time::Duration as StdDuration;

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::services::{DcaSchedulerConfig, LimitOrderWorkerConfig, MonitorConfig};
use crate::infrastructure::aggregator::AggregatorConfig as AggregatorClientConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse YAML configuration.
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),
    /// Configuration failed post-load validation.
    #[error("config validation failed: {0}")]
    ValidationError(String),
    /// A configuration key exposed to the client-facing bundle looked secret.
    #[error("config key '{0}' matches a sensitive-key pattern and cannot be exposed")]
    SensitiveKeyExposed(String),
}

/// `aggregator.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorSettings {
    /// `aggregator.baseUrl`.
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// `aggregator.apiKey` — server-side-only secret.
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// `aggregator.affiliateId`.
    #[serde(rename = "affiliateId", default)]
    pub affiliate_id: Option<String>,
}

impl AggregatorSettings {
    /// Build the HTTP client config from these settings.
    #[must_use]
    pub fn to_client_config(&self) -> AggregatorClientConfig {
        let mut config = AggregatorClientConfig::new(self.base_url.clone(), self.api_key.clone());
        if let Some(affiliate_id) = &self.affiliate_id {
            config = config.with_affiliate_id(affiliate_id.clone());
        }
        config
    }
}

/// `database.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// `database.url` — Turso connection string (e.g. a local file path).
    pub url: String,
    /// `database.pool.max` (default 10).
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
    /// Idle-connection timeout, seconds (spec §5: default 30s).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Connection-acquire timeout, seconds (spec §5: default 5s).
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

const fn default_pool_max() -> u32 {
    10
}
const fn default_idle_timeout_secs() -> u64 {
    30
}
const fn default_acquire_timeout_secs() -> u64 {
    5
}

/// `monitor.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// `monitor.tickInterval`, seconds (default 10).
    #[serde(rename = "tickInterval", default = "default_monitor_tick")]
    pub tick_interval_secs: u64,
    /// `monitor.maxConcurrent` (default 5).
    #[serde(rename = "maxConcurrent", default = "default_monitor_concurrency")]
    pub max_concurrent: usize,
}

const fn default_monitor_tick() -> u64 {
    10
}
const fn default_monitor_concurrency() -> usize {
    5
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_monitor_tick(),
            max_concurrent: default_monitor_concurrency(),
        }
    }
}

impl MonitorSettings {
    /// Build the Monitor's runtime config from these settings.
    #[must_use]
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick_interval: StdDuration::from_secs(self.tick_interval_secs),
            max_concurrent: self.max_concurrent,
            ..MonitorConfig::default()
        }
    }
}

/// `dca.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaSettings {
    /// `dca.tickInterval`, seconds (default 60).
    #[serde(rename = "tickInterval", default = "default_dca_tick")]
    pub tick_interval_secs: u64,
    /// `dca.retryDelay`, seconds (default 5 min).
    #[serde(rename = "retryDelay", default = "default_dca_retry_delay")]
    pub retry_delay_secs: i64,
    /// `dca.maxProcessingTime`, seconds (default 10 min).
    #[serde(rename = "maxProcessingTime", default = "default_dca_max_processing")]
    pub max_processing_time_secs: i64,
}

const fn default_dca_tick() -> u64 {
    60
}
const fn default_dca_retry_delay() -> i64 {
    5 * 60
}
const fn default_dca_max_processing() -> i64 {
    10 * 60
}

impl Default for DcaSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_dca_tick(),
            retry_delay_secs: default_dca_retry_delay(),
            max_processing_time_secs: default_dca_max_processing(),
        }
    }
}

impl DcaSettings {
    /// Build the DCA scheduler's runtime config from these settings.
    #[must_use]
    pub fn to_scheduler_config(&self) -> DcaSchedulerConfig {
        DcaSchedulerConfig {
            tick_interval: StdDuration::from_secs(self.tick_interval_secs),
            retry_delay: Duration::seconds(self.retry_delay_secs),
            max_processing_time: Duration::seconds(self.max_processing_time_secs),
        }
    }
}

/// `limit.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// `limit.tickInterval`, seconds (default 30).
    #[serde(rename = "tickInterval", default = "default_limit_tick")]
    pub tick_interval_secs: u64,
    /// `limit.maxStaleness`, seconds (default 10 min).
    #[serde(rename = "maxStaleness", default = "default_limit_staleness")]
    pub max_staleness_secs: i64,
    /// `limit.maxRetries` (default 5).
    #[serde(rename = "maxRetries", default = "default_limit_retries")]
    pub max_retries: u32,
}

const fn default_limit_tick() -> u64 {
    30
}
const fn default_limit_staleness() -> i64 {
    10 * 60
}
const fn default_limit_retries() -> u32 {
    5
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_limit_tick(),
            max_staleness_secs: default_limit_staleness(),
            max_retries: default_limit_retries(),
        }
    }
}

impl LimitSettings {
    /// Build the Limit-Order Worker's runtime config from these settings.
    #[must_use]
    pub fn to_worker_config(&self) -> LimitOrderWorkerConfig {
        LimitOrderWorkerConfig {
            tick_interval: StdDuration::from_secs(self.tick_interval_secs),
            max_staleness: Duration::seconds(self.max_staleness_secs),
            max_retries: self.max_retries,
        }
    }
}

/// `auth.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    /// `auth.tokenIssuer` — expected JWT `iss` claim.
    #[serde(rename = "tokenIssuer", default)]
    pub token_issuer: String,
    /// `auth.jwksUrl` — JWKS endpoint used to verify bearer tokens.
    #[serde(rename = "jwksUrl", default)]
    pub jwks_url: String,
}

/// HTTP server bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address, e.g. `"0.0.0.0"`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
const fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server bind settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// Aggregator client settings.
    pub aggregator: AggregatorSettings,
    /// Database connection settings.
    pub database: DatabaseSettings,
    /// Order Monitor settings.
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// DCA Scheduler settings.
    #[serde(default)]
    pub dca: DcaSettings,
    /// Limit-Order Worker settings.
    #[serde(default)]
    pub limit: LimitSettings,
    /// Auth verification settings.
    #[serde(default)]
    pub auth: AuthSettings,
}

/// Key-name patterns that must never be exposed to a client-facing bundle
/// (spec §6: `SECRET|API_KEY|DATABASE|PASSWORD|PRIVATE`).
fn sensitive_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)SECRET|API_KEY|DATABASE|PASSWORD|PRIVATE").expect("sensitive-key regex is valid")
    })
}

/// Guard: reject a configuration key from a client-facing bundle if its name
/// matches the sensitive-key pattern.
///
/// # Errors
///
/// Returns `ConfigError::SensitiveKeyExposed` if `key` matches.
pub fn guard_client_exposable(key: &str) -> Result<(), ConfigError> {
    if sensitive_key_pattern().is_match(key) {
        return Err(ConfigError::SensitiveKeyExposed(key.to_string()));
    }
    Ok(())
}

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (used by tests and `load_config`).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: AppConfig = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate `${VAR}`/`${VAR:-default}` references against the process
/// environment.
fn interpolate_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = ENV_VAR_REGEX
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("env var regex is valid"));

    let mut result = input.to_string();
    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else { continue };
        let Some(var_match) = cap.get(1) else { continue };
        let default_value = cap.get(2).map(|m| m.as_str());
        let value = match std::env::var(var_match.as_str()) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };
        result = result.replace(full_match.as_str(), &value);
    }
    result
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.aggregator.base_url.is_empty() {
        return Err(ConfigError::ValidationError("aggregator.baseUrl must not be empty".to_string()));
    }
    if config.database.url.is_empty() {
        return Err(ConfigError::ValidationError("database.url must not be empty".to_string()));
    }
    if config.database.pool_max == 0 {
        return Err(ConfigError::ValidationError("database.pool.max must be positive".to_string()));
    }
    if config.monitor.max_concurrent == 0 {
        return Err(ConfigError::ValidationError("monitor.maxConcurrent must be positive".to_string()));
    }
    if config.limit.max_retries == 0 {
        return Err(ConfigError::ValidationError("limit.maxRetries must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let yaml = r#"
aggregator:
  baseUrl: "https://api.example"
  apiKey: "key"
database:
  url: "swap.db"
"#;
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.monitor.tick_interval_secs, 10);
        assert_eq!(config.dca.tick_interval_secs, 60);
        assert_eq!(config.limit.max_retries, 5);
        assert_eq!(config.database.pool_max, 10);
    }

    #[test]
    fn env_var_interpolation_with_default() {
        let yaml = "aggregator:\n  baseUrl: \"${SWAP_CORE_TEST_MISSING:-https://fallback}\"\n  apiKey: \"key\"\ndatabase:\n  url: \"swap.db\"\n";
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.aggregator.base_url, "https://fallback");
    }

    #[test]
    fn rejects_empty_base_url() {
        let yaml = "aggregator:\n  baseUrl: \"\"\n  apiKey: \"key\"\ndatabase:\n  url: \"swap.db\"\n";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn sensitive_key_guard_rejects_matches() {
        assert!(guard_client_exposable("aggregator.apiKey").is_err());
        assert!(guard_client_exposable("database.url").is_err());
        assert!(guard_client_exposable("DB_PASSWORD").is_err());
        assert!(guard_client_exposable("monitor.tickInterval").is_ok());
    }
}
