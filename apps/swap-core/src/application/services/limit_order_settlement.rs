//! Limit-Order Settlement Listener.
//!
//! Subscribes to the Order Monitor's `OrderStatusChanged` notifications and
//! drives a fired `LimitOrder`'s terminal transition once its spawned order
//! reaches a terminal status. This is the only place that moves a limit
//! order out of `executing`: the worker that fires it never guesses at the
//! outcome (see `LimitOrderWorker::fire`).

use std::sync::Arc;

use crate::application::ports::{LimitOrderRepository, NotificationEvent, NotifierPort};
use crate::domain::limit_order::LimitOrderStatus;
use crate::domain::order::OrderStatus;
use crate::domain::shared::UserId;

/// Bridges Monitor order-status notifications to limit-order settlement.
pub struct LimitOrderSettlementListener {
    limit_orders: Arc<dyn LimitOrderRepository>,
}

impl LimitOrderSettlementListener {
    /// Build a listener over the limit-order repository it updates.
    #[must_use]
    pub const fn new(limit_orders: Arc<dyn LimitOrderRepository>) -> Self {
        Self { limit_orders }
    }
}

#[async_trait::async_trait]
impl NotifierPort for LimitOrderSettlementListener {
    async fn notify(&self, _user_id: &UserId, event: NotificationEvent) {
        let NotificationEvent::OrderStatusChanged { order_id, new_status, .. } = event else {
            return;
        };
        if !new_status.is_terminal() {
            return;
        }

        let mut limit_order = match self.limit_orders.find_by_spawned_order(&order_id).await {
            Ok(Some(lo)) => lo,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "failed to look up limit order for spawned order");
                return;
            }
        };

        if limit_order.status != LimitOrderStatus::Executing {
            return;
        }

        match new_status {
            OrderStatus::Settled => limit_order.mark_settled(),
            _ => limit_order.mark_failed(format!("spawned order {order_id} reached {new_status:?}")),
        }

        if let Err(e) = self.limit_orders.save(&limit_order).await {
            tracing::error!(limit_order_id = %limit_order.id, error = %e, "failed to persist limit order settlement");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PersistenceError;
    use crate::domain::limit_order::{Condition, LimitOrder};
    use crate::domain::shared::{Amount, AssetSymbol, ExternalOrderId, LimitOrderId, Network, Timestamp};
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    struct FakeLimitRepo {
        by_spawned: Mutex<Option<LimitOrder>>,
        saved: Mutex<Vec<LimitOrder>>,
    }

    #[async_trait::async_trait]
    impl LimitOrderRepository for FakeLimitRepo {
        async fn list_eligible(&self, _now: Timestamp) -> Result<Vec<LimitOrder>, PersistenceError> {
            Ok(vec![])
        }
        async fn save(&self, limit_order: &LimitOrder) -> Result<(), PersistenceError> {
            self.saved.lock().await.push(limit_order.clone());
            Ok(())
        }
        async fn find_by_spawned_order(&self, _order_id: &ExternalOrderId) -> Result<Option<LimitOrder>, PersistenceError> {
            Ok(self.by_spawned.lock().await.clone())
        }
    }

    fn executing_order(spawned: ExternalOrderId) -> LimitOrder {
        LimitOrder {
            id: LimitOrderId::generate(),
            user_id: UserId::new("u-1"),
            source_asset: AssetSymbol::new("USDC"),
            source_network: Network::new("polygon"),
            destination_asset: AssetSymbol::new("ETH"),
            destination_network: Network::new("ethereum"),
            amount: Amount::from(dec!(100)),
            target_price: Amount::from(dec!(2000)),
            condition: Condition::Below,
            reference_asset: AssetSymbol::new("ETH"),
            reference_network: Network::new("ethereum"),
            status: LimitOrderStatus::Executing,
            retry_count: 0,
            retry_after: None,
            last_error: None,
            spawned_order_id: Some(spawned),
        }
    }

    #[tokio::test]
    async fn settled_terminal_status_marks_limit_order_settled() {
        let spawned = ExternalOrderId::new("ext-1");
        let repo = Arc::new(FakeLimitRepo { by_spawned: Mutex::new(Some(executing_order(spawned.clone()))), saved: Mutex::new(vec![]) });
        let listener = LimitOrderSettlementListener::new(repo.clone());

        listener
            .notify(&UserId::new("u-1"), NotificationEvent::OrderStatusChanged {
                order_id: spawned,
                old_status: OrderStatus::Processing,
                new_status: OrderStatus::Settled,
            })
            .await;

        let saved = repo.saved.lock().await;
        assert_eq!(saved.last().unwrap().status, LimitOrderStatus::Settled);
    }

    #[tokio::test]
    async fn failed_terminal_status_marks_limit_order_failed() {
        let spawned = ExternalOrderId::new("ext-1");
        let repo = Arc::new(FakeLimitRepo { by_spawned: Mutex::new(Some(executing_order(spawned.clone()))), saved: Mutex::new(vec![]) });
        let listener = LimitOrderSettlementListener::new(repo.clone());

        listener
            .notify(&UserId::new("u-1"), NotificationEvent::OrderStatusChanged {
                order_id: spawned,
                old_status: OrderStatus::Processing,
                new_status: OrderStatus::Refunded,
            })
            .await;

        let saved = repo.saved.lock().await;
        assert_eq!(saved.last().unwrap().status, LimitOrderStatus::Failed);
    }

    #[tokio::test]
    async fn non_terminal_status_is_ignored() {
        let spawned = ExternalOrderId::new("ext-1");
        let repo = Arc::new(FakeLimitRepo { by_spawned: Mutex::new(Some(executing_order(spawned.clone()))), saved: Mutex::new(vec![]) });
        let listener = LimitOrderSettlementListener::new(repo.clone());

        listener
            .notify(&UserId::new("u-1"), NotificationEvent::OrderStatusChanged {
                order_id: spawned,
                old_status: OrderStatus::Pending,
                new_status: OrderStatus::Processing,
            })
            .await;

        assert!(repo.saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn no_matching_limit_order_is_a_noop() {
        let repo = Arc::new(FakeLimitRepo { by_spawned: Mutex::new(None), saved: Mutex::new(vec![]) });
        let listener = LimitOrderSettlementListener::new(repo.clone());

        listener
            .notify(&UserId::new("u-1"), NotificationEvent::OrderStatusChanged {
                order_id: ExternalOrderId::new("ext-1"),
                old_status: OrderStatus::Processing,
                new_status: OrderStatus::Settled,
            })
            .await;

        assert!(repo.saved.lock().await.is_empty());
    }
}
