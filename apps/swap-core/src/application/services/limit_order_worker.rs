//! Limit-Order Worker (spec §4.3).
//!
//! Every tick, evaluates every eligible armed `LimitOrder` against a cached
//! `PriceSnapshot`, enforcing a hard staleness guard before deciding, and
//! fires a real order when the condition trips.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::application::ports::{
    AggregatorError, AggregatorPort, LimitOrderRepository, NotificationEvent, NotifierPort,
    OrderRepository, OrderTracker, PersistenceError, PriceSnapshotRepository, UserDirectoryPort,
};
use crate::domain::limit_order::{LimitOrder, LimitOrderStatus};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::shared::Timestamp;

/// Worker tick interval (spec §4.3: "every 30s").
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(30);

/// Default staleness guard (spec §4.3 step 3).
pub const DEFAULT_MAX_STALENESS: Duration = Duration::minutes(10);

/// Default retry budget before a limit order goes `dead` (spec §4.3 step 7).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Configuration for the [`LimitOrderWorker`].
#[derive(Debug, Clone, Copy)]
pub struct LimitOrderWorkerConfig {
    /// How often the worker re-evaluates eligible limit orders.
    pub tick_interval: StdDuration,
    /// Maximum age a `PriceSnapshot` may have before it can no longer be
    /// used to decide (spec §4.3 step 3, "freshness or abstain").
    pub max_staleness: Duration,
    /// Retry attempts before a limit order is marked `dead`.
    pub max_retries: u32,
}

impl Default for LimitOrderWorkerConfig {
    fn default() -> Self {
        Self { tick_interval: TICK_INTERVAL, max_staleness: DEFAULT_MAX_STALENESS, max_retries: DEFAULT_MAX_RETRIES }
    }
}

/// Evaluates armed limit orders against fresh prices and fires real orders
/// when their condition trips (spec §4.3).
pub struct LimitOrderWorker {
    config: LimitOrderWorkerConfig,
    limit_orders: Arc<dyn LimitOrderRepository>,
    orders: Arc<dyn OrderRepository>,
    prices: Arc<dyn PriceSnapshotRepository>,
    users: Arc<dyn UserDirectoryPort>,
    aggregator: Arc<dyn AggregatorPort>,
    tracker: Arc<dyn OrderTracker>,
    notifier: Arc<dyn NotifierPort>,
    shutdown: Arc<tokio::sync::Notify>,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LimitOrderWorker {
    /// Construct a worker. `tracker` is the Monitor's `track` capability;
    /// `notifier` delivers the `LimitOrderDead` event (spec §4.3 step 7).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        limit_orders: Arc<dyn LimitOrderRepository>,
        orders: Arc<dyn OrderRepository>,
        prices: Arc<dyn PriceSnapshotRepository>,
        users: Arc<dyn UserDirectoryPort>,
        aggregator: Arc<dyn AggregatorPort>,
        tracker: Arc<dyn OrderTracker>,
        notifier: Arc<dyn NotifierPort>,
        config: LimitOrderWorkerConfig,
    ) -> Self {
        Self {
            config,
            limit_orders,
            orders,
            prices,
            users,
            aggregator,
            tracker,
            notifier,
            shutdown: Arc::new(tokio::sync::Notify::new()),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Start the tick loop. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
    }

    /// Signal the tick loop to stop and wait for the in-flight tick to
    /// finish.
    pub async fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = self.shutdown.notified() => {
                    tracing::info!("limit order worker stopping");
                    return;
                }
                () = tokio::time::sleep(self.config.tick_interval) => {}
            }
            if let Err(e) = self.evaluate_all().await {
                tracing::error!(error = %e, "limit order evaluation tick failed");
            }
        }
    }

    /// One tick: evaluate every eligible armed limit order (spec §4.3 steps
    /// 1-7). A failure evaluating one order never aborts the batch.
    ///
    /// # Errors
    ///
    /// Propagates a `PersistenceError` only if listing eligible orders
    /// itself fails.
    pub async fn evaluate_all(&self) -> Result<usize, PersistenceError> {
        let now = Timestamp::now();
        let eligible = self.limit_orders.list_eligible(now).await?;
        let count = eligible.len();
        for order in eligible {
            self.evaluate_one(order, now).await;
        }
        Ok(count)
    }

    async fn evaluate_one(&self, mut order: LimitOrder, now: Timestamp) {
        let snapshot = match self.prices.get(&order.reference_asset, &order.reference_network).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::debug!(limit_order_id = %order.id, "no cached price snapshot yet, skipping this tick");
                return;
            }
            Err(e) => {
                tracing::error!(limit_order_id = %order.id, error = %e, "failed to read price snapshot");
                return;
            }
        };

        let triggered = match order.evaluate(&snapshot, now, self.config.max_staleness) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(limit_order_id = %order.id, error = %e, "skipping stale-price evaluation");
                return;
            }
        };
        if !triggered {
            return;
        }

        order.trigger();
        self.fire(order, now).await;
    }

    /// Spec §4.3 step 5: quote, create an order, register it with the
    /// Monitor. Step 6/7 on failure: backoff, retry, or go dead.
    async fn fire(&self, mut order: LimitOrder, now: Timestamp) {
        let settlement = match self.users.settlement_info(&order.user_id).await {
            Ok(info) => info,
            Err(e) => {
                self.fail_transient(&mut order, now, format!("user lookup failed: {e}")).await;
                return;
            }
        };
        let Some(settlement_address) = settlement.settlement_address else {
            self.fail_permanent(&mut order, "user has no settlement address").await;
            return;
        };
        let refund_address = settlement.refund_address.unwrap_or_else(|| settlement_address.clone());

        let quote = match self
            .aggregator
            .get_quote(&order.source_asset, &order.source_network, &order.destination_asset, &order.destination_network, order.amount)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                self.handle_aggregator_error(&mut order, now, &e).await;
                return;
            }
        };

        let created = match self.aggregator.create_order(&quote.id, &settlement_address, &refund_address).await {
            Ok(c) => c,
            Err(e) => {
                self.handle_aggregator_error(&mut order, now, &e).await;
                return;
            }
        };

        // Both the quote and the order creation succeeded: move to
        // `executing` before touching durable state (spec §4.3 step 5).
        order.start_executing(created.id.clone());
        if let Err(e) = self.limit_orders.save(&order).await {
            tracing::error!(limit_order_id = %order.id, error = %e, "failed to persist executing state, will retry next reconcile");
            return;
        }

        let new_order = Order {
            external_order_id: created.id.clone(),
            user_id: order.user_id.clone(),
            source_asset: order.source_asset.clone(),
            source_network: order.source_network.clone(),
            source_amount: order.amount,
            destination_asset: order.destination_asset.clone(),
            destination_network: order.destination_network.clone(),
            expected_settle_amount: quote.settle_amount,
            deposit_address: created.deposit_address,
            deposit_memo: created.deposit_memo,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.orders.insert(&new_order).await {
            tracing::error!(order_id = %new_order.external_order_id, error = %e, "failed to persist limit-fired order");
            self.fail_transient(&mut order, now, format!("order insert failed: {e}")).await;
            return;
        }

        // The limit order stays `executing` until the Order Monitor observes
        // the spawned order reach a real terminal status; this worker never
        // marks it settled itself.
        if let Err(e) = self.tracker.track(new_order.external_order_id.clone(), new_order.user_id, now).await {
            tracing::error!(order_id = %new_order.external_order_id, error = %e, "failed to register limit-fired order with the monitor");
        }
    }

    async fn handle_aggregator_error(&self, order: &mut LimitOrder, now: Timestamp, error: &AggregatorError) {
        match error {
            AggregatorError::Transient { .. } => {
                self.fail_transient(order, now, error.to_string()).await;
            }
            AggregatorError::Permanent { .. } | AggregatorError::InvalidResponse(_) => {
                self.fail_permanent(order, error.to_string()).await;
            }
        }
    }

    async fn fail_transient(&self, order: &mut LimitOrder, now: Timestamp, error: impl Into<String> + Clone) {
        order.record_transient_failure(now, self.config.max_retries, error.clone());
        let went_dead = order.status == LimitOrderStatus::Dead;
        if let Err(e) = self.limit_orders.save(order).await {
            tracing::error!(limit_order_id = %order.id, error = %e, "failed to persist limit order retry state");
        }
        if went_dead {
            self.notifier
                .notify(&order.user_id, NotificationEvent::LimitOrderDead { limit_order_id: order.id.as_str().to_string(), last_error: error.into() })
                .await;
        }
    }

    async fn fail_permanent(&self, order: &mut LimitOrder, error: impl Into<String>) {
        order.mark_failed(error);
        if let Err(e) = self.limit_orders.save(order).await {
            tracing::error!(limit_order_id = %order.id, error = %e, "failed to persist limit order failed state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{CreatedOrder, Quote, StatusSnapshot, UserSettlementInfo};
    use crate::domain::limit_order::Condition;
    use crate::domain::price::PriceSnapshot;
    use crate::domain::shared::{Amount, AssetSymbol, LimitOrderId, Network, QuoteId, UserId};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    fn limit_order(condition: Condition, target: rust_decimal::Decimal) -> LimitOrder {
        LimitOrder {
            id: LimitOrderId::generate(),
            user_id: UserId::new("u-1"),
            source_asset: AssetSymbol::new("USDC"),
            source_network: Network::new("polygon"),
            destination_asset: AssetSymbol::new("ETH"),
            destination_network: Network::new("ethereum"),
            amount: Amount::from(dec!(100)),
            target_price: Amount::from(target),
            condition,
            reference_asset: AssetSymbol::new("ETH"),
            reference_network: Network::new("ethereum"),
            status: LimitOrderStatus::Armed,
            retry_count: 0,
            retry_after: None,
            last_error: None,
            spawned_order_id: None,
        }
    }

    struct FakeLimitRepo {
        eligible: AsyncMutex<Vec<LimitOrder>>,
        saved: AsyncMutex<Vec<LimitOrder>>,
    }

    #[async_trait::async_trait]
    impl LimitOrderRepository for FakeLimitRepo {
        async fn list_eligible(&self, _now: Timestamp) -> Result<Vec<LimitOrder>, PersistenceError> {
            Ok(std::mem::take(&mut *self.eligible.lock().await))
        }
        async fn save(&self, limit_order: &LimitOrder) -> Result<(), PersistenceError> {
            self.saved.lock().await.push(limit_order.clone());
            Ok(())
        }
        async fn find_by_spawned_order(&self, order_id: &crate::domain::shared::ExternalOrderId) -> Result<Option<LimitOrder>, PersistenceError> {
            Ok(self.saved.lock().await.iter().find(|o| o.spawned_order_id.as_ref() == Some(order_id)).cloned())
        }
    }

    struct FakeOrderRepo;

    #[async_trait::async_trait]
    impl OrderRepository for FakeOrderRepo {
        async fn insert(&self, _order: &Order) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn get(&self, _id: &crate::domain::shared::ExternalOrderId) -> Result<Option<Order>, PersistenceError> {
            Ok(None)
        }
        async fn update_status(&self, _id: &crate::domain::shared::ExternalOrderId, _status: OrderStatus, _updated_at: Timestamp) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn list_non_terminal(&self) -> Result<Vec<Order>, PersistenceError> {
            Ok(vec![])
        }
    }

    struct FakePrices {
        snapshot: Option<PriceSnapshot>,
    }

    #[async_trait::async_trait]
    impl PriceSnapshotRepository for FakePrices {
        async fn get(&self, _asset: &AssetSymbol, _network: &Network) -> Result<Option<PriceSnapshot>, PersistenceError> {
            Ok(self.snapshot.clone())
        }
    }

    struct FakeUsers;

    #[async_trait::async_trait]
    impl UserDirectoryPort for FakeUsers {
        async fn settlement_info(&self, _user_id: &UserId) -> Result<UserSettlementInfo, PersistenceError> {
            Ok(UserSettlementInfo { settlement_address: Some("addr1".to_string()), refund_address: Some("addr2".to_string()) })
        }
    }

    struct FakeAggregator;

    #[async_trait::async_trait]
    impl AggregatorPort for FakeAggregator {
        async fn get_quote(&self, _: &AssetSymbol, _: &Network, _: &AssetSymbol, _: &Network, _: Amount) -> Result<Quote, AggregatorError> {
            Ok(Quote { id: QuoteId::generate(), settle_amount: Amount::from(dec!(0.05)), rate: Amount::from(dec!(0.0005)), expiry: Timestamp::now() })
        }
        async fn create_order(&self, _: &QuoteId, _: &str, _: &str) -> Result<CreatedOrder, AggregatorError> {
            Ok(CreatedOrder { id: crate::domain::shared::ExternalOrderId::generate(), deposit_address: "0xdead".to_string(), deposit_memo: None, expires_at: Timestamp::now() })
        }
        async fn get_order_status(&self, _: &crate::domain::shared::ExternalOrderId) -> Result<StatusSnapshot, AggregatorError> {
            unimplemented!("not exercised by worker tests")
        }
    }

    #[derive(Default)]
    struct CountingTracker {
        tracked: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OrderTracker for CountingTracker {
        async fn track(&self, _order_id: crate::domain::shared::ExternalOrderId, _user_id: UserId, _created_at: Timestamp) -> Result<(), PersistenceError> {
            self.tracked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        dead_events: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NotifierPort for CountingNotifier {
        async fn notify(&self, _user_id: &UserId, event: NotificationEvent) {
            if matches!(event, NotificationEvent::LimitOrderDead { .. }) {
                self.dead_events.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn snapshot(price: rust_decimal::Decimal, updated_at: Timestamp) -> PriceSnapshot {
        PriceSnapshot {
            asset: AssetSymbol::new("ETH"),
            network: Network::new("ethereum"),
            price: Amount::from(price),
            updated_at,
            expires_at: Timestamp::from(updated_at.as_datetime() + chrono::Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn trigger_fires_order_and_stays_executing() {
        let limit_repo = Arc::new(FakeLimitRepo { eligible: AsyncMutex::new(vec![limit_order(Condition::Below, dec!(2000))]), saved: AsyncMutex::new(vec![]) });
        let tracker = Arc::new(CountingTracker::default());
        let worker = LimitOrderWorker::new(
            limit_repo.clone(),
            Arc::new(FakeOrderRepo),
            Arc::new(FakePrices { snapshot: Some(snapshot(dec!(1999), Timestamp::now())) }),
            Arc::new(FakeUsers),
            Arc::new(FakeAggregator),
            tracker.clone(),
            Arc::new(CountingNotifier::default()),
            LimitOrderWorkerConfig::default(),
        );

        let count = worker.evaluate_all().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(tracker.tracked.load(Ordering::SeqCst), 1);
        let saved = limit_repo.saved.lock().await;
        let last = saved.last().unwrap();
        assert_eq!(last.status, LimitOrderStatus::Executing);
        assert!(last.spawned_order_id.is_some());
    }

    #[tokio::test]
    async fn condition_not_met_stays_armed() {
        let limit_repo = Arc::new(FakeLimitRepo { eligible: AsyncMutex::new(vec![limit_order(Condition::Below, dec!(2000))]), saved: AsyncMutex::new(vec![]) });
        let tracker = Arc::new(CountingTracker::default());
        let worker = LimitOrderWorker::new(
            limit_repo.clone(),
            Arc::new(FakeOrderRepo),
            Arc::new(FakePrices { snapshot: Some(snapshot(dec!(2001), Timestamp::now())) }),
            Arc::new(FakeUsers),
            Arc::new(FakeAggregator),
            tracker.clone(),
            Arc::new(CountingNotifier::default()),
            LimitOrderWorkerConfig::default(),
        );
        worker.evaluate_all().await.unwrap();
        assert_eq!(tracker.tracked.load(Ordering::SeqCst), 0);
        assert!(limit_repo.saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_abstains() {
        let stale_time = Timestamp::from(chrono::Utc::now() - chrono::Duration::minutes(30));
        let limit_repo = Arc::new(FakeLimitRepo { eligible: AsyncMutex::new(vec![limit_order(Condition::Below, dec!(2000))]), saved: AsyncMutex::new(vec![]) });
        let worker = LimitOrderWorker::new(
            limit_repo.clone(),
            Arc::new(FakeOrderRepo),
            Arc::new(FakePrices { snapshot: Some(snapshot(dec!(1999), stale_time)) }),
            Arc::new(FakeUsers),
            Arc::new(FakeAggregator),
            Arc::new(CountingTracker::default()),
            Arc::new(CountingNotifier::default()),
            LimitOrderWorkerConfig::default(),
        );
        worker.evaluate_all().await.unwrap();
        assert!(limit_repo.saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn no_snapshot_yet_abstains() {
        let limit_repo = Arc::new(FakeLimitRepo { eligible: AsyncMutex::new(vec![limit_order(Condition::Below, dec!(2000))]), saved: AsyncMutex::new(vec![]) });
        let worker = LimitOrderWorker::new(
            limit_repo.clone(),
            Arc::new(FakeOrderRepo),
            Arc::new(FakePrices { snapshot: None }),
            Arc::new(FakeUsers),
            Arc::new(FakeAggregator),
            Arc::new(CountingTracker::default()),
            Arc::new(CountingNotifier::default()),
            LimitOrderWorkerConfig::default(),
        );
        worker.evaluate_all().await.unwrap();
        assert!(limit_repo.saved.lock().await.is_empty());
    }
}
