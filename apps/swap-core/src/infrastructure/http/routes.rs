//! Route handlers for the boundary REST API: `State` plus typed
//! request/response, delegating to application-layer collaborators.

use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;

use crate::application::ports::UserDirectoryPort as _;
use crate::domain::shared::{Timestamp, UserId};
use crate::error::CoreError;
use crate::infrastructure::auth::{Claims, require_same_user};

use super::dto::{
    ChatHistoryRequest, ChatHistoryResponse, CoinAdjustRequest, CoinAdjustResponse, CoinStatsResponse,
    GiftAllRequest, GiftAllResponse, SwapHistoryQuery, SwapHistoryResponse, UserSettingsQuery, UserSettingsResponse,
};
use super::middleware::require_auth;
use super::state::AppState;

/// Build the full axum router: `/health` unauthenticated, everything under
/// `/api` behind the bearer-auth middleware.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/swap-history", get(swap_history))
        .route("/chat/history", post(chat_history))
        .route("/user/settings", get(user_settings))
        .route("/admin/coins/adjust", post(coins_adjust))
        .route("/admin/coins/stats", get(coins_stats))
        .route("/admin/coins/gift-all", post(coins_gift_all))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new().route("/health", get(health)).nest("/api", api).with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn swap_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SwapHistoryQuery>,
) -> Result<Json<SwapHistoryResponse>, CoreError> {
    let requested = UserId::new(query.user_id);
    require_same_user(&claims.user_id(), &requested).map_err(|e| CoreError::Forbidden(e.to_string()))?;
    let orders = state.orders.list_by_user(&requested, query.limit).await?;
    Ok(Json(SwapHistoryResponse { orders }))
}

async fn chat_history(
    Extension(claims): Extension<Claims>,
    Json(body): Json<ChatHistoryRequest>,
) -> Result<(StatusCode, Json<ChatHistoryResponse>), CoreError> {
    if body.message.trim().is_empty() {
        return Err(CoreError::validation("message must not be empty", vec!["message".to_string()]));
    }
    let requested = UserId::new(body.user_id);
    require_same_user(&claims.user_id(), &requested).map_err(|e| CoreError::Forbidden(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(ChatHistoryResponse { accepted: true })))
}

async fn user_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UserSettingsQuery>,
) -> Result<Json<UserSettingsResponse>, CoreError> {
    let requested = UserId::new(query.user_id);
    require_same_user(&claims.user_id(), &requested).map_err(|e| CoreError::Forbidden(e.to_string()))?;
    // A user with settlement info but no explicit settings row gets the
    // schema default tolerance rather than a 404 -- settings are optional,
    // identity is not.
    state.users.settlement_info(&requested).await?;
    let tolerance = state
        .users
        .settings(&requested)
        .await?
        .map_or_else(|| Decimal::new(100, 4), |s| s.slippage_tolerance);
    Ok(Json(UserSettingsResponse { slippage_tolerance: tolerance }))
}

fn require_admin(claims: &Claims) -> Result<(), CoreError> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(CoreError::Forbidden("admin role required".to_string()))
    }
}

async fn coins_adjust(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CoinAdjustRequest>,
) -> Result<Json<CoinAdjustResponse>, CoreError> {
    require_admin(&claims)?;
    if body.amount.is_sign_negative() {
        return Err(CoreError::validation("amount must be non-negative", vec!["amount".to_string()]));
    }
    let target = UserId::new(body.target_user_id);
    let admin = claims.user_id();
    let now = Timestamp::now();
    let action = body.action.into();

    state
        .admin_ledger
        .record_coin_action(&target, &admin, action, body.amount, body.note.as_deref(), now)
        .await?;
    state
        .admin_ledger
        .append_audit(&admin, "coins.adjust", &format!("{action:?} {} -> {target}", body.amount), now)
        .await?;

    let net_balance_delta = state.admin_ledger.net_balance_delta(&target).await?;
    Ok(Json(CoinAdjustResponse { net_balance_delta }))
}

async fn coins_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CoinStatsResponse>, CoreError> {
    require_admin(&claims)?;
    let users = state.admin_ledger.all_user_ids().await?;
    let mut total_net_delta = Decimal::ZERO;
    for user in &users {
        total_net_delta += state.admin_ledger.net_balance_delta(user).await?;
    }
    Ok(Json(CoinStatsResponse { user_count: users.len(), total_net_delta }))
}

async fn coins_gift_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<GiftAllRequest>,
) -> Result<Json<GiftAllResponse>, CoreError> {
    require_admin(&claims)?;
    if body.amount.is_sign_negative() {
        return Err(CoreError::validation("amount must be non-negative", vec!["amount".to_string()]));
    }
    let admin = claims.user_id();
    let now = Timestamp::now();
    let users = state.admin_ledger.all_user_ids().await?;

    state
        .admin_ledger
        .record_coin_action_batch(
            &users,
            &admin,
            crate::infrastructure::persistence::CoinGiftAction::Gift,
            body.amount,
            body.note.as_deref(),
            now,
        )
        .await?;
    state
        .admin_ledger
        .append_audit(&admin, "coins.gift-all", &format!("gifted {} to {} users", body.amount, users.len()), now)
        .await?;

    Ok(Json(GiftAllResponse { recipients: users.len() }))
}
