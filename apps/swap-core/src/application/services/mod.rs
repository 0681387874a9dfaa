//! Use-case services: the three tick-driven components described in spec
//! §4. Each depends only on `application::ports` traits, so every one can
//! be exercised in isolation against fakes.

pub mod dca_scheduler;
pub mod limit_order_settlement;
pub mod limit_order_worker;
pub mod order_monitor;

pub use dca_scheduler::{DcaScheduler, DcaSchedulerConfig};
pub use limit_order_settlement::LimitOrderSettlementListener;
pub use limit_order_worker::{LimitOrderWorker, LimitOrderWorkerConfig};
pub use order_monitor::{MonitorConfig, OrderMonitor};
