//! Infrastructure layer: adapters implementing the application layer's ports
//! against real external systems (spec §4, §6).
//!
//! - `aggregator/`: HTTP client for the cross-chain exchange aggregator.
//! - `persistence/`: Turso-backed repositories.
//! - `http/`: the boundary REST API (spec §6).
//! - `auth/`: bearer-token verification for the boundary API.
//! - `telemetry/`: tracing/log initialization.
//! - `config/`: layered configuration loading.

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod http;
pub mod persistence;
pub mod telemetry;
