//! DCA Scheduler (spec §4.2).
//!
//! Claims due recurring plans via an atomic, skip-locked-equivalent claim
//! (see `infrastructure::persistence::dca` for the Turso transaction that
//! backs `DcaPlanRepository::claim_due`), then asynchronously quotes,
//! creates, and registers each resulting order with the Monitor.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::application::ports::{
    AggregatorError, AggregatorPort, DcaPlanRepository, OrderRepository, OrderTracker,
    PersistenceError, UserDirectoryPort, WatchedOrderRepository,
};
use crate::domain::dca::DcaPlan;
use crate::domain::order::{Order, OrderStatus, WatchedOrder};
use crate::domain::shared::{DcaPlanId, ExternalOrderId, Timestamp};

/// Scheduler tick interval (spec §4.2: "every 60s").
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Default claim lock duration (spec §4.2 step 2).
pub const DEFAULT_MAX_PROCESSING_TIME: Duration = Duration::minutes(10);

/// Default delay before retrying a transient per-plan failure (spec §4.2
/// step 4b/4c).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::minutes(5);

/// Configuration for the [`DcaScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct DcaSchedulerConfig {
    /// How often the scheduler looks for due plans.
    pub tick_interval: StdDuration,
    /// Claim lock duration written as the sentinel `next_execution_at`.
    pub max_processing_time: Duration,
    /// Delay before retrying a plan that failed transiently this tick.
    pub retry_delay: Duration,
}

impl Default for DcaSchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            max_processing_time: DEFAULT_MAX_PROCESSING_TIME,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Fires each due `DcaPlan` exactly once per interval, even under multiple
/// concurrent scheduler instances (spec §4.2).
pub struct DcaScheduler {
    config: DcaSchedulerConfig,
    plans: Arc<dyn DcaPlanRepository>,
    users: Arc<dyn UserDirectoryPort>,
    aggregator: Arc<dyn AggregatorPort>,
    tracker: Arc<dyn OrderTracker>,
    shutdown: Arc<tokio::sync::Notify>,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DcaScheduler {
    /// Construct a scheduler. `tracker` is the Monitor's `track` capability.
    #[must_use]
    pub fn new(
        plans: Arc<dyn DcaPlanRepository>,
        users: Arc<dyn UserDirectoryPort>,
        aggregator: Arc<dyn AggregatorPort>,
        tracker: Arc<dyn OrderTracker>,
        config: DcaSchedulerConfig,
    ) -> Self {
        Self {
            config,
            plans,
            users,
            aggregator,
            tracker,
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
                    tracing::info!("dca scheduler stopping");
                    return;
                }
                () = tokio::time::sleep(self.config.tick_interval) => {}
            }
            self.process_due().await;
        }
    }

    /// One scheduler tick: claim every due plan, then process each claimed
    /// plan independently. A failure processing one plan never aborts the
    /// batch (spec §4.2 step 4, "Recovery policy: local absorption").
    ///
    /// # Errors
    ///
    /// Propagates a `PersistenceError` only if the claim itself fails;
    /// per-plan processing failures are absorbed and logged.
    pub async fn process_due(&self) -> Result<usize, PersistenceError> {
        let now = Timestamp::now();
        let claimed = self.plans.claim_due(now, self.config.max_processing_time).await?;
        let count = claimed.len();
        for plan in claimed {
            self.execute_one(plan).await;
        }
        Ok(count)
    }

    /// Process a single claimed plan (spec §4.2 step 4a-4e). The plan is
    /// already durably claimed by the time this runs; every exit path here
    /// either records a real execution or reschedules the claim.
    async fn execute_one(&self, plan: DcaPlan) {
        let now = Timestamp::now();

        let settlement = match self.users.settlement_info(&plan.user_id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(plan_id = %plan.id, error = %e, "failed to load user for dca plan, rescheduling");
                self.reschedule(&plan.id, Self::next_due_after(now, plan.interval_hours)).await;
                return;
            }
        };
        let Some(settlement_address) = settlement.settlement_address else {
            tracing::warn!(plan_id = %plan.id, "dca plan's user has no settlement address, skipping this window");
            self.reschedule(&plan.id, Self::next_due_after(now, plan.interval_hours)).await;
            return;
        };
        let refund_address = settlement.refund_address.unwrap_or_else(|| settlement_address.clone());

        let quote = match self
            .aggregator
            .get_quote(&plan.source_asset, &plan.source_network, &plan.destination_asset, &plan.destination_network, plan.amount_per_execution)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                self.handle_aggregator_failure(&plan, &e, now);
                return;
            }
        };

        let created = match self.aggregator.create_order(&quote.id, &settlement_address, &refund_address).await {
            Ok(c) => c,
            Err(e) => {
                self.handle_aggregator_failure(&plan, &e, now);
                return;
            }
        };

        let order = Order {
            external_order_id: created.id.clone(),
            user_id: plan.user_id.clone(),
            source_asset: plan.source_asset.clone(),
            source_network: plan.source_network.clone(),
            source_amount: plan.amount_per_execution,
            destination_asset: plan.destination_asset.clone(),
            destination_network: plan.destination_network.clone(),
            expected_settle_amount: quote.settle_amount,
            deposit_address: created.deposit_address,
            deposit_memo: created.deposit_memo,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let watched = WatchedOrder {
            external_order_id: order.external_order_id.clone(),
            user_id: order.user_id.clone(),
            last_status: OrderStatus::Pending,
            created_at: now,
        };
        let next_execution_at = DcaPlan::next_due_after_execution(now, plan.interval_hours);

        if let Err(e) = self.plans.record_execution(&plan.id, &order, &watched, next_execution_at).await {
            tracing::error!(plan_id = %plan.id, error = %e, "failed to record dca execution, will retry this window on next reconcile");
            return;
        }

        if let Err(e) = self.tracker.track(order.external_order_id.clone(), order.user_id, now).await {
            tracing::error!(order_id = %order.external_order_id, error = %e, "failed to register dca-created order with the monitor");
        }
    }

    fn handle_aggregator_failure(&self, plan: &DcaPlan, error: &AggregatorError, now: Timestamp) {
        match error {
            AggregatorError::Transient { .. } => {
                tracing::warn!(plan_id = %plan.id, error = %error, "transient aggregator failure executing dca plan, retrying shortly");
                let retry_at = Timestamp::from(now.as_datetime() + self.config.retry_delay);
                self.reschedule_detached(plan.id.clone(), retry_at);
            }
            AggregatorError::Permanent { .. } | AggregatorError::InvalidResponse(_) => {
                tracing::error!(plan_id = %plan.id, error = %error, "permanent aggregator failure executing dca plan, deferring to next window");
                self.reschedule_detached(plan.id.clone(), Self::next_due_after(now, plan.interval_hours));
            }
        }
    }

    async fn reschedule(&self, plan_id: &DcaPlanId, next_execution_at: Timestamp) {
        if let Err(e) = self.plans.reschedule(plan_id, next_execution_at).await {
            tracing::error!(plan_id = %plan_id, error = %e, "failed to reschedule dca plan");
        }
    }

    fn reschedule_detached(&self, plan_id: DcaPlanId, next_execution_at: Timestamp) {
        // `execute_one` isn't `Send`-bounded across an extra await here in a way
        // that matters; this exists only to keep the call site terse.
        let plans = Arc::clone(&self.plans);
        tokio::spawn(async move {
            if let Err(e) = plans.reschedule(&plan_id, next_execution_at).await {
                tracing::error!(plan_id = %plan_id, error = %e, "failed to reschedule dca plan");
            }
        });
    }

    fn next_due_after(now: Timestamp, interval_hours: u32) -> Timestamp {
        DcaPlan::next_due_after_execution(now, interval_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{CreatedOrder, Quote, UserSettlementInfo};
    use crate::domain::shared::{Amount, AssetSymbol, Network, QuoteId, UserId};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    fn plan(id: DcaPlanId, due: bool) -> DcaPlan {
        let next = if due { Timestamp::from(chrono::Utc::now() - Duration::seconds(1)) } else { Timestamp::from(chrono::Utc::now() + Duration::hours(1)) };
        DcaPlan {
            id,
            user_id: UserId::new("u-1"),
            source_asset: AssetSymbol::new("USDC"),
            source_network: Network::new("polygon"),
            destination_asset: AssetSymbol::new("ETH"),
            destination_network: Network::new("ethereum"),
            amount_per_execution: Amount::from(dec!(100)),
            interval_hours: 24,
            next_execution_at: next,
            is_active: true,
            executed_count: 0,
        }
    }

    #[derive(Default)]
    struct FakePlanRepo {
        due: AsyncMutex<Vec<DcaPlan>>,
        executions: AtomicUsize,
        reschedules: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DcaPlanRepository for FakePlanRepo {
        async fn claim_due(&self, _now: Timestamp, _max_processing_time: Duration) -> Result<Vec<DcaPlan>, PersistenceError> {
            Ok(std::mem::take(&mut *self.due.lock().await))
        }
        async fn record_execution(&self, _plan_id: &DcaPlanId, _order: &Order, _watched: &WatchedOrder, _next_execution_at: Timestamp) -> Result<(), PersistenceError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn reschedule(&self, _plan_id: &DcaPlanId, _next_execution_at: Timestamp) -> Result<(), PersistenceError> {
            self.reschedules.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeUsers {
        has_settlement: bool,
    }

    #[async_trait::async_trait]
    impl UserDirectoryPort for FakeUsers {
        async fn settlement_info(&self, _user_id: &crate::domain::shared::UserId) -> Result<UserSettlementInfo, PersistenceError> {
            Ok(UserSettlementInfo {
                settlement_address: self.has_settlement.then(|| "addr1".to_string()),
                refund_address: self.has_settlement.then(|| "addr2".to_string()),
            })
        }
    }

    struct FakeAggregator {
        quote_result: Result<(), AggregatorError>,
    }

    #[async_trait::async_trait]
    impl AggregatorPort for FakeAggregator {
        async fn get_quote(&self, _: &AssetSymbol, _: &Network, _: &AssetSymbol, _: &Network, _: Amount) -> Result<Quote, AggregatorError> {
            self.quote_result.clone().map(|()| Quote {
                id: QuoteId::generate(),
                settle_amount: Amount::from(dec!(0.05)),
                rate: Amount::from(dec!(0.0005)),
                expiry: Timestamp::now(),
            })
        }
        async fn create_order(&self, _: &QuoteId, _: &str, _: &str) -> Result<CreatedOrder, AggregatorError> {
            Ok(CreatedOrder {
                id: ExternalOrderId::generate(),
                deposit_address: "0xdeadbeef".to_string(),
                deposit_memo: None,
                expires_at: Timestamp::now(),
            })
        }
        async fn get_order_status(&self, _: &ExternalOrderId) -> Result<crate::application::ports::StatusSnapshot, AggregatorError> {
            unimplemented!("not exercised by scheduler tests")
        }
    }

    #[derive(Default)]
    struct CountingTracker {
        tracked: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OrderTracker for CountingTracker {
        async fn track(&self, _order_id: ExternalOrderId, _user_id: crate::domain::shared::UserId, _created_at: Timestamp) -> Result<(), PersistenceError> {
            self.tracked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn happy_path_creates_order_and_tracks_it() {
        let repo = Arc::new(FakePlanRepo::default());
        repo.due.lock().await.push(plan(DcaPlanId::generate(), true));
        let tracker = Arc::new(CountingTracker::default());
        let scheduler = DcaScheduler::new(
            repo.clone(),
            Arc::new(FakeUsers { has_settlement: true }),
            Arc::new(FakeAggregator { quote_result: Ok(()) }),
            tracker.clone(),
            DcaSchedulerConfig::default(),
        );

        let claimed = scheduler.process_due().await.unwrap();
        assert_eq!(claimed, 1);
        assert_eq!(repo.executions.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.tracked.load(Ordering::SeqCst), 1);
        assert_eq!(repo.reschedules.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_settlement_address_reschedules_without_executing() {
        let repo = Arc::new(FakePlanRepo::default());
        repo.due.lock().await.push(plan(DcaPlanId::generate(), true));
        let scheduler = DcaScheduler::new(
            repo.clone(),
            Arc::new(FakeUsers { has_settlement: false }),
            Arc::new(FakeAggregator { quote_result: Ok(()) }),
            Arc::new(CountingTracker::default()),
            DcaSchedulerConfig::default(),
        );

        scheduler.process_due().await.unwrap();
        assert_eq!(repo.executions.load(Ordering::SeqCst), 0);
        assert_eq!(repo.reschedules.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_quote_failure_does_not_execute() {
        let repo = Arc::new(FakePlanRepo::default());
        repo.due.lock().await.push(plan(DcaPlanId::generate(), true));
        let scheduler = DcaScheduler::new(
            repo.clone(),
            Arc::new(FakeUsers { has_settlement: true }),
            Arc::new(FakeAggregator {
                quote_result: Err(AggregatorError::Transient { http_status: Some(503), message: "down".to_string(), retry_after: None }),
            }),
            Arc::new(CountingTracker::default()),
            DcaSchedulerConfig::default(),
        );

        scheduler.process_due().await.unwrap();
        assert_eq!(repo.executions.load(Ordering::SeqCst), 0);
        // Reschedule happens on a detached task; give it a moment.
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(repo.reschedules.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_due_plans_is_a_noop() {
        let repo = Arc::new(FakePlanRepo::default());
        let scheduler = DcaScheduler::new(
            repo.clone(),
            Arc::new(FakeUsers { has_settlement: true }),
            Arc::new(FakeAggregator { quote_result: Ok(()) }),
            Arc::new(CountingTracker::default()),
            DcaSchedulerConfig::default(),
        );
        let claimed = scheduler.process_due().await.unwrap();
        assert_eq!(claimed, 0);
    }
}
