//! Request/response bodies for the boundary REST API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::Order;
use crate::infrastructure::persistence::CoinGiftAction;

/// Query params for `GET /api/swap-history`.
#[derive(Debug, Deserialize)]
pub struct SwapHistoryQuery {
    /// The user whose history is requested; must equal the caller's
    /// authenticated identity (IDOR guard).
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Page size, default 50.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const fn default_limit() -> u32 {
    50
}

/// Response body for `GET /api/swap-history`.
#[derive(Debug, Serialize)]
pub struct SwapHistoryResponse {
    /// The user's orders, newest first.
    pub orders: Vec<Order>,
}

/// Query params for `GET /api/user/settings`.
#[derive(Debug, Deserialize)]
pub struct UserSettingsQuery {
    /// The user whose settings are requested.
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Response body for `GET /api/user/settings`.
#[derive(Debug, Serialize)]
pub struct UserSettingsResponse {
    /// Slippage tolerance as a fixed-point fraction (e.g. `0.0100` == 1%).
    pub slippage_tolerance: Decimal,
}

/// Request body for `POST /api/chat/history`. The conversation/chat
/// subsystem itself is out of scope (spec §1); this endpoint only validates
/// the request and enforces auth/IDOR, returning a deterministic
/// acknowledgement (spec §1, "stubs that return deterministic data").
#[derive(Debug, Deserialize)]
pub struct ChatHistoryRequest {
    /// The authoring user; must equal the caller's authenticated identity.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// The message text.
    pub message: String,
}

/// Response body for `POST /api/chat/history`.
#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    /// Echoes back whether the message was accepted.
    pub accepted: bool,
}

/// Request body for `POST /api/admin/coins/adjust`.
#[derive(Debug, Deserialize)]
pub struct CoinAdjustRequest {
    /// The user whose balance is being adjusted.
    #[serde(rename = "targetUserId")]
    pub target_user_id: String,
    /// The kind of adjustment.
    pub action: CoinActionParam,
    /// Magnitude of the adjustment (always non-negative; `action` carries
    /// the sign).
    pub amount: Decimal,
    /// Optional admin note, stored alongside the ledger entry.
    pub note: Option<String>,
}

/// Wire representation of `CoinGiftAction`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinActionParam {
    /// See `CoinGiftAction::Gift`.
    Gift,
    /// See `CoinGiftAction::Deduct`.
    Deduct,
    /// See `CoinGiftAction::Reset`.
    Reset,
}

impl From<CoinActionParam> for CoinGiftAction {
    fn from(value: CoinActionParam) -> Self {
        match value {
            CoinActionParam::Gift => Self::Gift,
            CoinActionParam::Deduct => Self::Deduct,
            CoinActionParam::Reset => Self::Reset,
        }
    }
}

/// Response body for `POST /api/admin/coins/adjust`.
#[derive(Debug, Serialize)]
pub struct CoinAdjustResponse {
    /// The user's net balance delta after this adjustment.
    pub net_balance_delta: Decimal,
}

/// Response body for `GET /api/admin/coins/stats`.
#[derive(Debug, Serialize)]
pub struct CoinStatsResponse {
    /// Number of users with at least one recorded coin action.
    pub user_count: usize,
    /// Sum of every user's net balance delta.
    pub total_net_delta: Decimal,
}

/// Request body for `POST /api/admin/coins/gift-all`.
#[derive(Debug, Deserialize)]
pub struct GiftAllRequest {
    /// Amount credited to every user.
    pub amount: Decimal,
    /// Optional admin note, stored alongside every ledger entry.
    pub note: Option<String>,
}

/// Response body for `POST /api/admin/coins/gift-all`.
#[derive(Debug, Serialize)]
pub struct GiftAllResponse {
    /// How many users received the gift.
    pub recipients: usize,
}
