//! Order-tracking capability (driven port).
//!
//! The DCA scheduler and the limit-order worker both need to hand freshly
//! created orders to the Order Monitor, but neither should depend on the
//! Monitor's concrete type. Spec §9 models this as a one-way
//! `{track(orderID, user, createdAt)}` capability; `OrderMonitor` implements
//! it directly (see `application::services::order_monitor`).

use async_trait::async_trait;

use crate::application::ports::PersistenceError;
use crate::domain::shared::{ExternalOrderId, Timestamp, UserId};

/// Narrow capability for registering a newly created order with whatever is
/// watching order status. Producers (DCA, limit orders) depend on this
/// trait, never on the Monitor concretely.
#[async_trait]
pub trait OrderTracker: Send + Sync {
    /// Register `order_id` for status tracking.
    async fn track(&self, order_id: ExternalOrderId, user_id: UserId, created_at: Timestamp) -> Result<(), PersistenceError>;
}
