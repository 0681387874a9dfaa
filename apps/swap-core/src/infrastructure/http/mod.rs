//! Boundary REST API (spec §6): axum router, bearer-auth middleware, and the
//! request/response DTOs for the routes this core shares a datastore with.

mod dto;
mod middleware;
mod routes;
mod state;

pub use routes::build_router;
pub use state::AppState;
