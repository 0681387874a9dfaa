//! Order bounded context.
//!
//! An [`Order`] is a single swap instance created from an aggregator quote.
//! A [`WatchedOrder`] is the durable registration record that lets the Order
//! Monitor survive a process restart without losing track of anything
//! non-terminal. [`StatusLog`] is the append-only audit trail of every
//! observed transition.

use serde::{Deserialize, Serialize};

use crate::domain::shared::{Amount, AssetSymbol, DomainError, ExternalOrderId, Network, Timestamp, UserId};

/// Status of an [`Order`], as observed from the aggregator.
///
/// The Monitor never invents a status; it only persists what the
/// aggregator reports. The set of transitions below is therefore a
/// description of the aggregator's own state machine, not a constraint
/// this crate enforces by construction — see [`OrderStatus::can_transition_to`]
/// for the validation used to flag unexpected aggregator behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, aggregator has not yet observed a deposit.
    Pending,
    /// Aggregator has observed a deposit and is waiting for confirmations.
    Waiting,
    /// Funds are in flight through the aggregator's settlement pipeline.
    Processing,
    /// Terminal: funds were delivered to the destination address.
    Settled,
    /// Terminal: funds were returned to the sender.
    Refunded,
    /// Terminal: the aggregator could not complete the swap.
    Failed,
    /// Terminal: the order's deposit window elapsed with no action.
    Expired,
}

impl OrderStatus {
    /// Terminal statuses from which no further transitions are expected.
    pub const TERMINAL: &'static [Self] = &[Self::Settled, Self::Refunded, Self::Failed, Self::Expired];

    /// True if this status is terminal (the order should no longer be
    /// polled or tracked in memory).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Settled | Self::Refunded | Self::Failed | Self::Expired)
    }

    /// True if `self -> next` is a transition the aggregator's state
    /// machine is documented to produce.
    ///
    /// This is advisory, not enforced at the repository layer: the
    /// aggregator is the authoritative source of truth, and a status-log
    /// anomaly should be logged, not used to reject a write.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self {
            Self::Pending => matches!(
                next,
                Self::Waiting | Self::Processing | Self::Settled | Self::Refunded | Self::Failed | Self::Expired
            ),
            Self::Waiting => matches!(
                next,
                Self::Processing | Self::Settled | Self::Refunded | Self::Failed | Self::Expired
            ),
            Self::Processing => matches!(next, Self::Settled | Self::Refunded | Self::Failed | Self::Expired),
            Self::Settled | Self::Refunded | Self::Failed | Self::Expired => false,
        }
    }
}

/// A single swap instance created from a quote.
///
/// Never deleted; only terminal-archived (left in place with a terminal
/// `status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// The aggregator's order ID; unique across the whole datastore.
    pub external_order_id: ExternalOrderId,
    /// Owning user.
    pub user_id: UserId,
    /// Source asset ticker.
    pub source_asset: AssetSymbol,
    /// Source network.
    pub source_network: Network,
    /// Amount deposited by the user, in source-asset units.
    pub source_amount: Amount,
    /// Destination asset ticker.
    pub destination_asset: AssetSymbol,
    /// Destination network.
    pub destination_network: Network,
    /// Amount the aggregator committed to deliver, in destination-asset
    /// units, at quote time.
    pub expected_settle_amount: Amount,
    /// Address the user must deposit `source_amount` to.
    pub deposit_address: String,
    /// Optional deposit memo/tag (required by some chains, e.g. XRP).
    pub deposit_memo: Option<String>,
    /// Current status, as last observed from the aggregator.
    pub status: OrderStatus,
    /// When this row was first created.
    pub created_at: Timestamp,
    /// When this row was last mutated.
    pub updated_at: Timestamp,
}

impl Order {
    /// Apply an observed status transition, validating the new amount and
    /// bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` only as a log-worthy
    /// signal the caller may choose to downgrade to a warning; the
    /// aggregator remains authoritative and the caller decides whether to
    /// persist the transition regardless.
    pub fn observe_status(&mut self, new_status: OrderStatus, now: Timestamp) -> Result<(), DomainError> {
        if self.status == new_status {
            return Ok(());
        }
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                entity: "Order".to_string(),
                from: format!("{:?}", self.status),
                to: format!("{new_status:?}"),
                reason: "transition not documented in the aggregator's state machine".to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = now;
        Ok(())
    }
}

/// Durable registration record enabling crash-safe monitoring.
///
/// A `WatchedOrder` exists for every non-terminal `Order` until terminal
/// state is recorded. Insertion is idempotent (on-conflict-do-nothing on
/// `external_order_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedOrder {
    /// The order being watched; unique.
    pub external_order_id: ExternalOrderId,
    /// Owning user, duplicated here so listeners don't need an Order join.
    pub user_id: UserId,
    /// Last status observed by the Monitor.
    pub last_status: OrderStatus,
    /// When this watch registration was created.
    pub created_at: Timestamp,
}

/// Append-only audit record of an observed order-status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLogEntry {
    /// The order this transition belongs to.
    pub external_order_id: ExternalOrderId,
    /// Status before the transition.
    pub old_status: OrderStatus,
    /// Status after the transition.
    pub new_status: OrderStatus,
    /// When the Monitor recorded this entry.
    pub emitted_at: Timestamp,
    /// A stable fingerprint of the aggregator payload that produced this
    /// transition (used to detect duplicate deliveries, not to carry the
    /// payload itself).
    pub payload_fingerprint: String,
}
