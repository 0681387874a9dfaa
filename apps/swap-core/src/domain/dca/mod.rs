//! DCA (dollar-cost-averaging) bounded context.
//!
//! A [`DcaPlan`] is a recurring user intent: execute the same swap every
//! `interval_hours`. The claim-and-execute protocol that turns a due plan
//! into a real order lives in the application layer
//! (`application::services::dca_scheduler`); this module only carries the
//! aggregate's shape and the invariants it must never violate.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Amount, AssetSymbol, DcaPlanId, DomainError, Network, Timestamp, UserId};

/// A recurring swap intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaPlan {
    /// Unique identifier.
    pub id: DcaPlanId,
    /// Owning user.
    pub user_id: UserId,
    /// Source asset ticker.
    pub source_asset: AssetSymbol,
    /// Source network.
    pub source_network: Network,
    /// Destination asset ticker.
    pub destination_asset: AssetSymbol,
    /// Destination network.
    pub destination_network: Network,
    /// Amount swapped per execution.
    pub amount_per_execution: Amount,
    /// Interval between executions, in hours. Always positive.
    pub interval_hours: u32,
    /// When this plan is next due. While `is_active`, this is either
    /// strictly in the future or a lock sentinel set within the last
    /// `MAX_PROCESSING_TIME`.
    pub next_execution_at: Timestamp,
    /// Whether this plan is still being scheduled.
    pub is_active: bool,
    /// Count of orders created by this plan so far. Incremented in the
    /// same transaction as each Order insert, so it always equals the
    /// number of orders whose creation transaction incremented it.
    pub executed_count: u64,
}

impl DcaPlan {
    /// Construct a new plan, due for its first execution at `first_execution_at`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidValue` if `interval_hours` is zero or
    /// the amount is not positive.
    pub fn new(
        id: DcaPlanId,
        user_id: UserId,
        source_asset: AssetSymbol,
        source_network: Network,
        destination_asset: AssetSymbol,
        destination_network: Network,
        amount_per_execution: Amount,
        interval_hours: u32,
        first_execution_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if interval_hours == 0 {
            return Err(DomainError::InvalidValue {
                field: "interval_hours".to_string(),
                message: "interval must be a positive number of hours".to_string(),
            });
        }
        amount_per_execution.validate_for_order()?;
        Ok(Self {
            id,
            user_id,
            source_asset,
            source_network,
            destination_asset,
            destination_network,
            amount_per_execution,
            interval_hours,
            next_execution_at: first_execution_at,
            is_active: true,
            executed_count: 0,
        })
    }

    /// Is this plan due for a claim at `now`?
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_active && self.next_execution_at.as_datetime() <= now.as_datetime()
    }

    /// Compute the lock-sentinel timestamp a claiming worker should write
    /// into `next_execution_at` to reserve this plan for up to
    /// `max_processing_time`.
    #[must_use]
    pub fn lock_sentinel(now: Timestamp, max_processing_time: Duration) -> Timestamp {
        Timestamp::from(now.as_datetime() + max_processing_time)
    }

    /// Compute the next regular due time after a successful execution.
    #[must_use]
    pub fn next_due_after_execution(now: Timestamp, interval_hours: u32) -> Timestamp {
        Timestamp::from(now.as_datetime() + Duration::hours(i64::from(interval_hours)))
    }

    /// Mark one execution as complete: bump `executed_count` and reschedule
    /// for the next regular interval.
    pub fn record_execution(&mut self, now: Timestamp) {
        self.executed_count += 1;
        self.next_execution_at = Self::next_due_after_execution(now, self.interval_hours);
    }

    /// Reschedule without counting an execution (used when a claimed plan
    /// could not proceed, e.g. the user has no settlement address, or a
    /// transient failure needs a short retry).
    pub fn reschedule(&mut self, next_at: Timestamp) {
        self.next_execution_at = next_at;
    }

    /// Deactivate the plan so it is never claimed again.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
