//! Limit-order bounded context.
//!
//! A [`LimitOrder`] is a user intent armed to fire a real swap once a
//! monitored price crosses a target. The armed-to-fire pipeline that reads
//! it lives in the application layer (`application::services::limit_order_worker`);
//! this module only carries the aggregate's shape, the condition-evaluation
//! logic, and the retry/backoff arithmetic the worker delegates to.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::price::PriceSnapshot;
use crate::domain::shared::{Amount, AssetSymbol, DomainError, ExternalOrderId, LimitOrderId, Network, Timestamp, UserId};

/// The price comparison a [`LimitOrder`] is armed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Fires when the reference price rises above the target.
    Above,
    /// Fires when the reference price falls below the target.
    Below,
}

impl Condition {
    /// Does `price` satisfy this condition against `target`?
    #[must_use]
    pub fn is_met(self, price: Amount, target: Amount) -> bool {
        match self {
            Self::Above => price > target,
            Self::Below => price < target,
        }
    }
}

/// Lifecycle status of a [`LimitOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitOrderStatus {
    /// Waiting for its condition to trip.
    Armed,
    /// Condition tripped; about to request a quote and create an order.
    Triggered,
    /// Quote/order creation in flight.
    Executing,
    /// The resulting order reached a terminal, successful state.
    Settled,
    /// The resulting order failed, or quote/order creation failed permanently.
    Failed,
    /// Retry budget exhausted; no further attempts will be made.
    Dead,
}

/// Maximum retry-after backoff, per spec §4.3 (`MAX_RETRIES` default backoff cap).
pub const MAX_BACKOFF: Duration = Duration::from_secs(30 * 60);

/// A price-armed swap intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrder {
    /// Unique identifier.
    pub id: LimitOrderId,
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
    /// Amount to swap once triggered.
    pub amount: Amount,
    /// Target price that trips the condition.
    pub target_price: Amount,
    /// Comparison against the target.
    pub condition: Condition,
    /// The asset whose cached price is evaluated against `target_price`.
    pub reference_asset: AssetSymbol,
    /// The chain the reference price is quoted on.
    pub reference_network: Network,
    /// Current lifecycle status.
    pub status: LimitOrderStatus,
    /// Number of transient failures observed so far.
    pub retry_count: u32,
    /// Do not re-evaluate before this time (set after a transient failure).
    pub retry_after: Option<Timestamp>,
    /// Most recent error message, for operator/user visibility.
    pub last_error: Option<String>,
    /// The real swap order this limit order fired, once `executing`. Set
    /// when quote+order creation succeeds; used to look this limit order
    /// back up once that order reaches a terminal status.
    pub spawned_order_id: Option<ExternalOrderId>,
}

impl LimitOrder {
    /// True if this order should be considered for evaluation this tick:
    /// armed, and its `retry_after` cooldown (if any) has elapsed.
    #[must_use]
    pub fn is_eligible(&self, now: Timestamp) -> bool {
        self.status == LimitOrderStatus::Armed
            && self
                .retry_after
                .is_none_or(|retry_after| retry_after.as_datetime() <= now.as_datetime())
    }

    /// Evaluate this order's condition against a price snapshot, honoring
    /// the staleness guard (spec §4.3 step 3): a snapshot older than
    /// `max_staleness` relative to `now` must never be used to decide.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::BusinessRuleViolation` (tagged as a stale-price
    /// condition) if the snapshot is too old to decide on; the caller should
    /// treat this as `StalePriceError` and skip the tick.
    pub fn evaluate(
        &self,
        snapshot: &PriceSnapshot,
        now: Timestamp,
        max_staleness: chrono::Duration,
    ) -> Result<bool, DomainError> {
        if !snapshot.is_fresh(now, max_staleness) {
            return Err(DomainError::BusinessRuleViolation {
                rule: "STALE_PRICE".to_string(),
                message: format!(
                    "price snapshot for {}/{} last updated {} is older than the staleness threshold",
                    self.reference_asset, self.reference_network, snapshot.updated_at
                ),
            });
        }
        Ok(self.condition.is_met(snapshot.price, self.target_price))
    }

    /// Move an armed order into `triggered` after its condition trips.
    pub fn trigger(&mut self) {
        self.status = LimitOrderStatus::Triggered;
    }

    /// Move a triggered order into `executing` once quote+order creation
    /// succeeds, recording which real order now owns the lifecycle.
    pub fn start_executing(&mut self, spawned_order_id: ExternalOrderId) {
        self.status = LimitOrderStatus::Executing;
        self.spawned_order_id = Some(spawned_order_id);
    }

    /// Record a successful execution: the resulting order now owns the
    /// lifecycle, so this limit order is done.
    pub fn mark_settled(&mut self) {
        self.status = LimitOrderStatus::Settled;
        self.retry_after = None;
        self.last_error = None;
    }

    /// Record a transient failure: bump `retry_count`, schedule the next
    /// attempt with exponential backoff (base 2, capped at `MAX_BACKOFF`),
    /// and transition to `dead` once `max_retries` is exhausted.
    pub fn record_transient_failure(&mut self, now: Timestamp, max_retries: u32, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        if self.retry_count >= max_retries {
            self.status = LimitOrderStatus::Dead;
            self.retry_after = None;
            return;
        }
        let backoff = Self::backoff_for(self.retry_count);
        self.retry_after = Some(Timestamp::from(now.as_datetime() + chrono_duration(backoff)));
    }

    /// Record a permanent failure (e.g. a permanent aggregator error that
    /// cannot be retried with a fresh quote).
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = LimitOrderStatus::Failed;
        self.last_error = Some(error.into());
    }

    /// Exponential backoff for the `n`th retry: `2^n` minutes, capped at
    /// `MAX_BACKOFF`. `backoff_for(1) == 1m`, matching spec S5
    /// (1m, 2m, 4m, 8m, 16m for retries 1..=5).
    #[must_use]
    pub fn backoff_for(retry_count: u32) -> Duration {
        let minutes = 2u64.saturating_pow(retry_count.saturating_sub(1));
        Duration::from_secs(minutes.saturating_mul(60)).min(MAX_BACKOFF)
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(price: rust_decimal::Decimal, updated_at: Timestamp) -> PriceSnapshot {
        PriceSnapshot {
            asset: AssetSymbol::new("ETH"),
            network: Network::new("ethereum"),
            price: Amount::from(price),
            updated_at,
            expires_at: Timestamp::from(updated_at.as_datetime() + chrono::Duration::hours(1)),
        }
    }

    fn order() -> LimitOrder {
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
            status: LimitOrderStatus::Armed,
            retry_count: 0,
            retry_after: None,
            last_error: None,
            spawned_order_id: None,
        }
    }

    #[test]
    fn condition_above_and_below() {
        assert!(Condition::Above.is_met(Amount::from(dec!(10)), Amount::from(dec!(5))));
        assert!(!Condition::Above.is_met(Amount::from(dec!(4)), Amount::from(dec!(5))));
        assert!(Condition::Below.is_met(Amount::from(dec!(4)), Amount::from(dec!(5))));
        assert!(!Condition::Below.is_met(Amount::from(dec!(6)), Amount::from(dec!(5))));
    }

    #[test]
    fn evaluate_stale_snapshot_is_rejected() {
        let o = order();
        let now = Timestamp::now();
        let stale = snapshot(dec!(1999), Timestamp::from(now.as_datetime() - chrono::Duration::minutes(15)));
        let result = o.evaluate(&stale, now, chrono::Duration::minutes(10));
        assert!(result.is_err());
    }

    #[test]
    fn evaluate_fresh_snapshot_below_trips() {
        let o = order();
        let now = Timestamp::now();
        let fresh = snapshot(dec!(1999), now);
        assert!(o.evaluate(&fresh, now, chrono::Duration::minutes(10)).unwrap());
    }

    #[test]
    fn evaluate_fresh_snapshot_not_met() {
        let o = order();
        let now = Timestamp::now();
        let fresh = snapshot(dec!(2001), now);
        assert!(!o.evaluate(&fresh, now, chrono::Duration::minutes(10)).unwrap());
    }

    #[test]
    fn is_eligible_honors_retry_after() {
        let mut o = order();
        let now = Timestamp::now();
        assert!(o.is_eligible(now));
        o.retry_after = Some(Timestamp::from(now.as_datetime() + chrono::Duration::minutes(1)));
        assert!(!o.is_eligible(now));
    }

    #[test]
    fn backoff_sequence_matches_spec_s5() {
        assert_eq!(LimitOrder::backoff_for(1), Duration::from_secs(60));
        assert_eq!(LimitOrder::backoff_for(2), Duration::from_secs(120));
        assert_eq!(LimitOrder::backoff_for(3), Duration::from_secs(240));
        assert_eq!(LimitOrder::backoff_for(4), Duration::from_secs(480));
        assert_eq!(LimitOrder::backoff_for(5), Duration::from_secs(960));
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(LimitOrder::backoff_for(20), MAX_BACKOFF);
    }

    #[test]
    fn record_transient_failure_goes_dead_at_max_retries() {
        let mut o = order();
        let now = Timestamp::now();
        for _ in 0..4 {
            o.record_transient_failure(now, 5, "503");
            assert_eq!(o.status, LimitOrderStatus::Armed);
        }
        o.record_transient_failure(now, 5, "503");
        assert_eq!(o.status, LimitOrderStatus::Dead);
        assert_eq!(o.retry_count, 5);
    }

    #[test]
    fn mark_settled_clears_retry_state() {
        let mut o = order();
        o.retry_after = Some(Timestamp::now());
        o.last_error = Some("x".to_string());
        o.mark_settled();
        assert_eq!(o.status, LimitOrderStatus::Settled);
        assert!(o.retry_after.is_none());
        assert!(o.last_error.is_none());
    }
}
