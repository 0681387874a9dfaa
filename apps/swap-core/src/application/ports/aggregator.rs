//! Aggregator port (driven port).
//!
//! Interface for the external cross-chain exchange aggregator (spec §4.4).
//! The concrete HTTP adapter lives in
//! `infrastructure::aggregator`; every use case in this crate depends only
//! on this trait, so tests can swap in a fake (spec §9, "global mutable
//! state" design note).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::shared::{Amount, AssetSymbol, ExternalOrderId, Network, QuoteId};

/// A short-TTL price commitment from the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Opaque quote identifier, passed to `create_order`.
    pub id: QuoteId,
    /// Amount the aggregator commits to deliver at the destination.
    pub settle_amount: Amount,
    /// Effective exchange rate for this quote.
    pub rate: Amount,
    /// When this quote expires and can no longer be used to create an order.
    pub expiry: crate::domain::shared::Timestamp,
}

/// The aggregator's response to creating an order from a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOrder {
    /// The aggregator's external order ID.
    pub id: ExternalOrderId,
    /// Address the user must deposit funds to.
    pub deposit_address: String,
    /// Optional deposit memo/tag.
    pub deposit_memo: Option<String>,
    /// When the deposit window for this order elapses.
    pub expires_at: crate::domain::shared::Timestamp,
}

/// A point-in-time status read from the aggregator for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Status as reported by the aggregator (spec §4.1 state machine).
    pub status: crate::domain::order::OrderStatus,
    /// Deposit transaction hash, once observed.
    pub deposit_hash: Option<String>,
    /// Settlement transaction hash, once observed.
    pub settle_hash: Option<String>,
    /// When the aggregator last updated this status.
    pub updated_at: crate::domain::shared::Timestamp,
}

/// Errors surfaced by the aggregator port, classified per spec §7.
#[derive(Debug, Error, Clone)]
pub enum AggregatorError {
    /// Network timeout, 5xx, or 429 — the caller should retry per its own
    /// policy. `retry_after` is populated when the aggregator sent one.
    #[error("transient aggregator error (http {http_status:?}): {message}")]
    Transient {
        /// HTTP status code, if the failure happened at the transport layer.
        http_status: Option<u16>,
        /// Aggregator-reported or transport-level message.
        message: String,
        /// `Retry-After` seconds, when the aggregator sent one (e.g. on 429).
        retry_after: Option<u64>,
    },
    /// An aggregator-reported permanent failure (e.g. `QUOTE_EXPIRED`,
    /// `INSUFFICIENT_FUNDS`, `INVALID_ADDRESS`). `code` is the aggregator's
    /// own error code, used by callers to reclassify per their own lookup
    /// table (spec §7, `PermanentUpstreamError`).
    #[error("permanent aggregator error [{code}]: {message}")]
    Permanent {
        /// Aggregator-assigned error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// The response failed schema validation (spec §4.4: every response
    /// MUST be validated before being returned to a caller).
    #[error("invalid aggregator response: {0}")]
    InvalidResponse(String),
}

impl AggregatorError {
    /// True if this error should be retried by the caller's own policy.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The `Retry-After` duration the aggregator suggested, if any.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Driven port for the external cross-chain exchange aggregator.
#[async_trait]
pub trait AggregatorPort: Send + Sync {
    /// Request a quote for swapping `amount` of `from_asset`/`from_network`
    /// into `to_asset`/`to_network`.
    async fn get_quote(
        &self,
        from_asset: &AssetSymbol,
        from_network: &Network,
        to_asset: &AssetSymbol,
        to_network: &Network,
        amount: Amount,
    ) -> Result<Quote, AggregatorError>;

    /// Create a real order from a previously-quoted `quote_id`.
    async fn create_order(
        &self,
        quote_id: &QuoteId,
        settle_address: &str,
        refund_address: &str,
    ) -> Result<CreatedOrder, AggregatorError>;

    /// Read the current status of a previously-created order.
    async fn get_order_status(&self, order_id: &ExternalOrderId) -> Result<StatusSnapshot, AggregatorError>;
}
