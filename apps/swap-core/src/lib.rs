// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Swap orchestration core.
//!
//! The coordination layer behind a cross-chain asset-exchange platform:
//! tracking in-flight swaps to completion, executing recurring DCA intents,
//! and firing price-armed limit orders. The chat UI, admin dashboard, smart
//! contract, and natural-language intent parser around this core are out of
//! scope; this crate implements the Order Monitor, DCA Scheduler, and
//! Limit-Order Worker, their shared persistence, and the REST boundary they
//! sit behind.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: aggregates and value objects, no I/O
//!   - `order`: `Order`, `WatchedOrder`, `StatusLogEntry`
//!   - `dca`: `DcaPlan`
//!   - `limit_order`: `LimitOrder`
//!   - `price`: `PriceSnapshot`
//!
//! - **Application**: ports and use-case services
//!   - `ports`: `AggregatorPort`, repository traits, `NotifierPort`, `OrderTracker`
//!   - `services`: `OrderMonitor`, `DcaScheduler`, `LimitOrderWorker`
//!
//! - **Infrastructure**: adapters
//!   - `aggregator`: validated HTTP client to the exchange aggregator
//!   - `persistence`: Turso-backed repositories
//!   - `http`: the boundary REST API
//!   - `auth`: bearer-token verification, IDOR guard
//!   - `config`: layered configuration
//!   - `telemetry`: tracing init

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - aggregates and value objects, no I/O.
pub mod domain;

/// Application layer - ports and use-case services.
pub mod application;

/// Infrastructure layer - adapters for external systems.
pub mod infrastructure;

/// Top-level error type and its HTTP mapping.
pub mod error;

pub use error::{CoreError, HttpErrorBody};

pub use domain::dca::DcaPlan;
pub use domain::limit_order::LimitOrder;
pub use domain::order::{Order, OrderStatus, StatusLogEntry, WatchedOrder};
pub use domain::price::PriceSnapshot;
pub use domain::shared::{Amount, AssetSymbol, DcaPlanId, ExternalOrderId, LimitOrderId, Network, Timestamp, UserId};

pub use application::ports::{AggregatorPort, NotifierPort, OrderTracker, PersistenceError};
pub use application::services::{DcaScheduler, LimitOrderSettlementListener, LimitOrderWorker, OrderMonitor};

pub use infrastructure::aggregator::HttpAggregatorClient;
pub use infrastructure::config::AppConfig;
pub use infrastructure::http::{AppState, build_router};
pub use infrastructure::persistence::SwapDatabase;
