//! Domain layer.
//!
//! The innermost layer: aggregates, value objects, and domain errors, with
//! zero infrastructure dependencies. The application layer orchestrates
//! these types against ports; nothing in this layer performs I/O.
//!
//! # Bounded contexts
//!
//! - [`order`]: the `Order` aggregate, its `WatchedOrder` registration, and
//!   the `StatusLog` audit trail (spec §3, §4.1).
//! - [`dca`]: the recurring `DcaPlan` aggregate and its claim arithmetic
//!   (spec §4.2).
//! - [`limit_order`]: the price-armed `LimitOrder` aggregate and its
//!   condition/backoff arithmetic (spec §4.3).
//! - [`price`]: the cached `PriceSnapshot` and its freshness guard.
//! - [`shared`]: value objects and errors used across every context.

pub mod dca;
pub mod limit_order;
pub mod order;
pub mod price;
pub mod shared;
