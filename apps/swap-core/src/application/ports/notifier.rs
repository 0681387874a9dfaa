//! Notification port (driven port).
//!
//! The Monitor, DCA scheduler, and limit-order worker all need to reach
//! user-facing channels (chat, push, email) without depending on them
//! directly. Spec §9 models this as a one-way `{notify(user, event)}`
//! capability the application provides; this crate only defines the shape.

use async_trait::async_trait;

use crate::domain::order::OrderStatus;
use crate::domain::shared::{ExternalOrderId, UserId};

/// An event worth notifying a user about.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// An order transitioned from `old_status` to `new_status`.
    ///
    /// Listeners must be idempotent by `(order_id, new_status)` (spec §5,
    /// §8 round-trip laws): at-least-once delivery is the contract, not
    /// exactly-once.
    OrderStatusChanged {
        /// The order that changed.
        order_id: ExternalOrderId,
        /// Status before the transition.
        old_status: OrderStatus,
        /// Status after the transition.
        new_status: OrderStatus,
    },
    /// A limit order exhausted its retry budget and will never fire.
    LimitOrderDead {
        /// The limit order's identifier, as a plain string (avoids a
        /// dependency from this port on the limit-order module).
        limit_order_id: String,
        /// The last error observed before giving up.
        last_error: String,
    },
}

/// Driven port for delivering user-facing notifications.
///
/// Spec §5: listener invocations must not block the poll loop. Concrete
/// implementations are expected to hand off onto a bounded queue or spawned
/// task rather than doing synchronous I/O inline; `notify` itself is just
/// the boundary this crate depends on.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Deliver `event` to `user_id`. Implementations should not let a slow
    /// downstream channel block the caller's tick loop.
    async fn notify(&self, user_id: &UserId, event: NotificationEvent);
}

/// A notifier that logs and drops — used for components/tests that don't
/// need real delivery (spec's chat/push channels are out of scope; this
/// crate only owns the capability boundary).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

#[async_trait]
impl NotifierPort for NoOpNotifier {
    async fn notify(&self, user_id: &UserId, event: NotificationEvent) {
        tracing::debug!(user_id = %user_id, event = ?event, "notification dropped (no-op notifier)");
    }
}
