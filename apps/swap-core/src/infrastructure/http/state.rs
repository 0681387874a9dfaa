//! Application state shared across handlers.

use std::sync::Arc;

use crate::infrastructure::auth::JwtVerifier;
use crate::infrastructure::persistence::{AdminLedgerPort, TursoOrderRepository, TursoUserRepository};

/// State handed to every axum handler: an `Arc`-of-adapters bundle cloned
/// per request.
#[derive(Clone)]
pub struct AppState {
    /// Order history reads for `/api/swap-history`.
    pub orders: Arc<TursoOrderRepository>,
    /// User settings reads for `/api/user/settings`.
    pub users: Arc<TursoUserRepository>,
    /// Admin coin-ledger writes and audit log.
    pub admin_ledger: Arc<dyn AdminLedgerPort>,
    /// Bearer-token verifier.
    pub jwt: Arc<JwtVerifier>,
}
