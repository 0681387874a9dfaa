//! Aggregator API wire types.
//!
//! These map directly to the aggregator's REST responses; every response is
//! validated before being turned into an `application::ports::aggregator`
//! type (spec §4.4: "Each response MUST be validated against a declarative
//! schema before being returned").

use serde::{Deserialize, Serialize};

use crate::application::ports::{AggregatorError, CreatedOrder, Quote, StatusSnapshot};
use crate::domain::order::OrderStatus;
use crate::domain::shared::{ExternalOrderId, QuoteId, Timestamp};

/// Request body for `POST /v2/quotes`.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequest<'a> {
    #[serde(rename = "depositCoin")]
    pub deposit_coin: &'a str,
    #[serde(rename = "depositNetwork")]
    pub deposit_network: &'a str,
    #[serde(rename = "settleCoin")]
    pub settle_coin: &'a str,
    #[serde(rename = "settleNetwork")]
    pub settle_network: &'a str,
    #[serde(rename = "depositAmount")]
    pub deposit_amount: String,
    #[serde(rename = "affiliateId", skip_serializing_if = "Option::is_none")]
    pub affiliate_id: Option<&'a str>,
}

/// Raw response from `POST /v2/quotes`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponseWire {
    pub id: String,
    #[serde(rename = "settleAmount")]
    pub settle_amount: String,
    pub rate: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}

impl QuoteResponseWire {
    /// Validate and convert to the port-level `Quote`.
    pub fn validate(self) -> Result<Quote, AggregatorError> {
        let settle_amount = self
            .settle_amount
            .parse()
            .map_err(|e| AggregatorError::InvalidResponse(format!("settleAmount: {e}")))?;
        let rate = self
            .rate
            .parse()
            .map_err(|e| AggregatorError::InvalidResponse(format!("rate: {e}")))?;
        let expiry = Timestamp::parse(&self.expires_at)
            .map_err(|e| AggregatorError::InvalidResponse(format!("expiresAt: {e}")))?;
        Ok(Quote {
            id: QuoteId::new(self.id),
            settle_amount,
            rate,
            expiry,
        })
    }
}

/// Request body for `POST /v2/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest<'a> {
    #[serde(rename = "quoteId")]
    pub quote_id: &'a str,
    #[serde(rename = "settleAddress")]
    pub settle_address: &'a str,
    #[serde(rename = "refundAddress")]
    pub refund_address: &'a str,
}

/// Raw response from `POST /v2/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponseWire {
    pub id: String,
    #[serde(rename = "depositAddress")]
    pub deposit_address: String,
    #[serde(rename = "depositMemo")]
    pub deposit_memo: Option<String>,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}

impl CreateOrderResponseWire {
    pub fn validate(self) -> Result<CreatedOrder, AggregatorError> {
        if self.deposit_address.is_empty() {
            return Err(AggregatorError::InvalidResponse(
                "depositAddress is empty".to_string(),
            ));
        }
        let expires_at = Timestamp::parse(&self.expires_at)
            .map_err(|e| AggregatorError::InvalidResponse(format!("expiresAt: {e}")))?;
        Ok(CreatedOrder {
            id: ExternalOrderId::new(self.id),
            deposit_address: self.deposit_address,
            deposit_memo: self.deposit_memo,
            expires_at,
        })
    }
}

/// Raw response from `GET /v2/orders/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusResponseWire {
    pub status: String,
    #[serde(rename = "depositHash")]
    pub deposit_hash: Option<String>,
    #[serde(rename = "settleHash")]
    pub settle_hash: Option<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl OrderStatusResponseWire {
    pub fn validate(self) -> Result<StatusSnapshot, AggregatorError> {
        let status = parse_status(&self.status)
            .ok_or_else(|| AggregatorError::InvalidResponse(format!("unknown status: {}", self.status)))?;
        let updated_at = Timestamp::parse(&self.updated_at)
            .map_err(|e| AggregatorError::InvalidResponse(format!("updatedAt: {e}")))?;
        Ok(StatusSnapshot {
            status,
            deposit_hash: self.deposit_hash,
            settle_hash: self.settle_hash,
            updated_at,
        })
    }
}

fn parse_status(raw: &str) -> Option<OrderStatus> {
    match raw {
        "pending" => Some(OrderStatus::Pending),
        "waiting" => Some(OrderStatus::Waiting),
        "processing" => Some(OrderStatus::Processing),
        "settled" => Some(OrderStatus::Settled),
        "refunded" => Some(OrderStatus::Refunded),
        "failed" => Some(OrderStatus::Failed),
        "expired" => Some(OrderStatus::Expired),
        _ => None,
    }
}

/// An aggregator-reported error body, `{code, message}`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AggregatorErrorResponse {
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_response_validates() {
        let wire = QuoteResponseWire {
            id: "q-1".into(),
            settle_amount: "1.5".into(),
            rate: "0.00042".into(),
            expires_at: "2026-01-01T00:00:00Z".into(),
        };
        let quote = wire.validate().unwrap();
        assert_eq!(quote.id.as_str(), "q-1");
    }

    #[test]
    fn quote_response_rejects_bad_decimal() {
        let wire = QuoteResponseWire {
            id: "q-1".into(),
            settle_amount: "not-a-number".into(),
            rate: "0.1".into(),
            expires_at: "2026-01-01T00:00:00Z".into(),
        };
        assert!(wire.validate().is_err());
    }

    #[test]
    fn create_order_response_rejects_empty_address() {
        let wire = CreateOrderResponseWire {
            id: "o-1".into(),
            deposit_address: String::new(),
            deposit_memo: None,
            expires_at: "2026-01-01T00:00:00Z".into(),
        };
        assert!(wire.validate().is_err());
    }

    #[test]
    fn status_response_parses_known_status() {
        let wire = OrderStatusResponseWire {
            status: "settled".into(),
            deposit_hash: Some("0xabc".into()),
            settle_hash: Some("0xdef".into()),
            updated_at: "2026-01-01T00:00:00Z".into(),
        };
        let snapshot = wire.validate().unwrap();
        assert_eq!(snapshot.status, OrderStatus::Settled);
    }

    #[test]
    fn status_response_rejects_unknown_status() {
        let wire = OrderStatusResponseWire {
            status: "quantum".into(),
            deposit_hash: None,
            settle_hash: None,
            updated_at: "2026-01-01T00:00:00Z".into(),
        };
        assert!(wire.validate().is_err());
    }
}
