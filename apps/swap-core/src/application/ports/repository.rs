//! Persistence ports (driven ports).
//!
//! Every repository trait here is implemented once, against Turso, under
//! `infrastructure::persistence`. Use cases depend only on these traits so
//! they can be exercised against an in-memory fake in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::dca::DcaPlan;
use crate::domain::limit_order::LimitOrder;
use crate::domain::order::{Order, StatusLogEntry, WatchedOrder};
use crate::domain::price::PriceSnapshot;
use crate::domain::shared::{AssetSymbol, DcaPlanId, ExternalOrderId, LimitOrderId, Network, Timestamp, UserId};

/// Errors from a persistence adapter (spec §7, `PersistenceError`).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The underlying database connection or query failed.
    #[error("database error: {0}")]
    Database(String),
    /// A row existed but could not be decoded into its domain type.
    #[error("decode error: {0}")]
    Decode(String),
    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// A settlement/refund address pair, the minimum a component needs to know
/// about a user to act on their behalf. The identity subsystem that manages
/// wallet-ownership proof is out of scope (spec §9).
#[derive(Debug, Clone)]
pub struct UserSettlementInfo {
    /// Address funds should be delivered to.
    pub settlement_address: Option<String>,
    /// Address funds should be refunded to on failure.
    pub refund_address: Option<String>,
}

/// Read-only lookup of the settlement/refund addresses a DCA execution or
/// limit-order fire needs. Everything else about users (settings, auth) is
/// out of this core's scope beyond this boundary.
#[async_trait]
pub trait UserDirectoryPort: Send + Sync {
    /// Look up a user's settlement info.
    async fn settlement_info(&self, user_id: &UserId) -> Result<UserSettlementInfo, PersistenceError>;
}

/// Repository for the `Order` aggregate.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a freshly created order.
    async fn insert(&self, order: &Order) -> Result<(), PersistenceError>;

    /// Look up an order by its external ID.
    async fn get(&self, id: &ExternalOrderId) -> Result<Option<Order>, PersistenceError>;

    /// Persist an observed status transition for an existing order.
    async fn update_status(
        &self,
        id: &ExternalOrderId,
        status: crate::domain::order::OrderStatus,
        updated_at: Timestamp,
    ) -> Result<(), PersistenceError>;

    /// All orders whose status is not terminal (spec §3: re-seeds the
    /// Monitor's in-memory set at startup and during reconciliation).
    async fn list_non_terminal(&self) -> Result<Vec<Order>, PersistenceError>;
}

/// Repository for the `WatchedOrder` durable registration record.
#[async_trait]
pub trait WatchedOrderRepository: Send + Sync {
    /// Idempotent insert (on-conflict-do-nothing on `external_order_id`).
    /// Returns `true` if a new row was inserted, `false` if it already existed.
    async fn insert_if_absent(&self, watched: &WatchedOrder) -> Result<bool, PersistenceError>;

    /// Update the last-known status of a watched order.
    async fn update_status(
        &self,
        id: &ExternalOrderId,
        status: crate::domain::order::OrderStatus,
    ) -> Result<(), PersistenceError>;

    /// All watched-order rows, terminal or not (used by `load_pending` to
    /// re-seed the in-memory tracked set; rows are terminal-archived, never
    /// deleted — spec §3 Order invariant).
    async fn list_all(&self) -> Result<Vec<WatchedOrder>, PersistenceError>;
}

/// Append-only repository for `StatusLogEntry` rows.
#[async_trait]
pub trait StatusLogRepository: Send + Sync {
    /// Append one transition record.
    async fn append(&self, entry: &StatusLogEntry) -> Result<(), PersistenceError>;
}

/// Repository for `DcaPlan` rows, including the skip-locked-equivalent claim
/// protocol (spec §4.2).
#[async_trait]
pub trait DcaPlanRepository: Send + Sync {
    /// Atomically claim every plan due at `now`, writing the lock sentinel
    /// (`now + max_processing_time`) into `next_execution_at` for each
    /// claimed row within the same transaction (spec §4.2 steps 1-3).
    async fn claim_due(
        &self,
        now: Timestamp,
        max_processing_time: chrono::Duration,
    ) -> Result<Vec<DcaPlan>, PersistenceError>;

    /// In a single transaction: insert the resulting `Order`, insert its
    /// `WatchedOrder` (on-conflict-do-nothing), and advance the plan to its
    /// next regular due time with `executed_count` incremented (spec §4.2
    /// step 4d, invariant: `executed_count` increments only alongside an
    /// Order insert in the same transaction).
    async fn record_execution(
        &self,
        plan_id: &DcaPlanId,
        order: &Order,
        watched: &WatchedOrder,
        next_execution_at: Timestamp,
    ) -> Result<(), PersistenceError>;

    /// Reschedule a claimed plan without counting an execution (no
    /// settlement address, or a transient failure needing a short retry).
    async fn reschedule(&self, plan_id: &DcaPlanId, next_execution_at: Timestamp) -> Result<(), PersistenceError>;
}

/// Repository for `LimitOrder` rows.
#[async_trait]
pub trait LimitOrderRepository: Send + Sync {
    /// All limit orders eligible for evaluation this tick: `armed` and
    /// `retry_after` null or in the past (spec §4.3 step 1).
    async fn list_eligible(&self, now: Timestamp) -> Result<Vec<LimitOrder>, PersistenceError>;

    /// Persist the full mutable state of a limit order after one tick's
    /// evaluation (status, retry bookkeeping).
    async fn save(&self, limit_order: &LimitOrder) -> Result<(), PersistenceError>;

    /// Look up the limit order (if any) whose fired swap order is `order_id`.
    /// Used to drive a limit order's terminal transition once the Order
    /// Monitor observes the spawned order reach `settled`/`failed`/etc.
    async fn find_by_spawned_order(&self, order_id: &ExternalOrderId) -> Result<Option<LimitOrder>, PersistenceError>;
}

/// Read-only repository for cached `PriceSnapshot` rows. Snapshots are
/// produced by a refresh job out of scope for this crate; this trait is
/// consumer-side only (spec §5, "Shared-resource policy").
#[async_trait]
pub trait PriceSnapshotRepository: Send + Sync {
    /// Look up the latest cached price for `(asset, network)`.
    async fn get(&self, asset: &AssetSymbol, network: &Network) -> Result<Option<PriceSnapshot>, PersistenceError>;
}
