//! Route modules and the assembled application router.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod proposals;
pub mod stories;

/// Builds the full router with every route mounted.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/stories", stories::router())
        .nest("/api/v1/proposals", proposals::router())
        .with_state(state)
}
