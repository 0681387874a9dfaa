//! Cached external price bounded context.
//!
//! A [`PriceSnapshot`] is produced by a refresh job (out of scope for this
//! crate's tick loops; it is consumed here read-only) and is the only thing
//! a [`super::limit_order::LimitOrder`] is allowed to make an execution
//! decision against, subject to the freshness guard in [`PriceSnapshot::is_fresh`].

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Amount, AssetSymbol, Network, Timestamp};

/// Default staleness threshold: a snapshot older than this must not be used
/// for a decision-critical read (spec §3, `PriceSnapshot` invariant).
pub const DEFAULT_MAX_STALENESS: Duration = Duration::minutes(10);

/// A cached external price for one `(asset, network)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Asset ticker this price quotes.
    pub asset: AssetSymbol,
    /// Chain the price was observed on.
    pub network: Network,
    /// The price itself.
    pub price: Amount,
    /// When this snapshot was last refreshed.
    pub updated_at: Timestamp,
    /// When this snapshot should be considered expired outright (a separate,
    /// usually longer, concern from the decision-making staleness guard).
    pub expires_at: Timestamp,
}

impl PriceSnapshot {
    /// Is this snapshot fresh enough, as of `now`, to decide on with a
    /// `max_staleness` threshold?
    ///
    /// Spec invariant 5 (§8): no limit-order execution occurs based on a
    /// snapshot whose `updated_at` precedes the trigger time by more than
    /// `max_staleness`.
    #[must_use]
    pub fn is_fresh(&self, now: Timestamp, max_staleness: Duration) -> bool {
        now.as_datetime().signed_duration_since(self.updated_at.as_datetime()) <= max_staleness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(age: Duration) -> PriceSnapshot {
        let now = Timestamp::now();
        PriceSnapshot {
            asset: AssetSymbol::new("ETH"),
            network: Network::new("ethereum"),
            price: Amount::from(rust_decimal::Decimal::new(2000, 0)),
            updated_at: Timestamp::from(now.as_datetime() - age),
            expires_at: Timestamp::from(now.as_datetime() + Duration::hours(1)),
        }
    }

    #[test]
    fn fresh_within_threshold() {
        let s = snap(Duration::minutes(5));
        assert!(s.is_fresh(Timestamp::now(), DEFAULT_MAX_STALENESS));
    }

    #[test]
    fn stale_beyond_threshold() {
        let s = snap(Duration::minutes(15));
        assert!(!s.is_fresh(Timestamp::now(), DEFAULT_MAX_STALENESS));
    }

    #[test]
    fn exactly_at_threshold_is_fresh() {
        let s = snap(Duration::minutes(10));
        assert!(s.is_fresh(Timestamp::now(), DEFAULT_MAX_STALENESS));
    }
}
