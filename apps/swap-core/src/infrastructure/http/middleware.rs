//! Bearer-token auth middleware, grounded on
//! `cooprefr-bettersys`'s `auth::middleware::auth_middleware` -- extract the
//! token, verify it, stash the claims on the request for handlers to read.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::CoreError;
use crate::infrastructure::auth::AuthError;

use super::state::AppState;

/// Verify the `Authorization: Bearer ...` header and attach `Claims` to the
/// request's extensions for downstream handlers.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let Some(token) = token else {
        return auth_error_response(AuthError::MissingToken);
    };

    match state.jwt.verify(token).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => auth_error_response(e),
    }
}

fn auth_error_response(err: AuthError) -> Response {
    let core_err = match err {
        AuthError::MissingToken | AuthError::InvalidToken(_) | AuthError::UnknownKey(_) | AuthError::JwksFetch(_) => {
            CoreError::Unauthenticated(err.to_string())
        }
        AuthError::Idor => CoreError::Forbidden(err.to_string()),
    };
    core_err.into_response()
}
