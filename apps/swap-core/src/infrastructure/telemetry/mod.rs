//! Tracing initialization: a plain `tracing_subscriber::fmt()` setup with
//! an env-filter, no OTLP/OpenTelemetry export -- console/JSON logging via
//! `tracing-subscriber`'s env-filter is the whole ambient logging stack
//! this binary needs.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from `RUST_LOG`, defaulting to
/// `info` if unset or unparsable.
///
/// # Panics
///
/// Panics if a subscriber has already been installed.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();

    tracing::info!("tracing initialized");
}
