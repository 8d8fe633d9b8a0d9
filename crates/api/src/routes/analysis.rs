//! Route definitions for brand analysis runs.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::analysis;
use crate::state::AppState;

/// Routes mounted at `/brands/{brand_id}/analysis`.
///
/// ```text
/// GET    /status          -> get_status
/// POST   /runs            -> start_run
/// ```
pub fn brand_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(analysis::get_status))
        .route("/runs", post(analysis::start_run))
}

/// Routes mounted at `/analysis/runs`.
///
/// ```text
/// POST   /{run_id}/cancel -> cancel_run
/// ```
pub fn run_router() -> Router<AppState> {
    Router::new().route("/{run_id}/cancel", post(analysis::cancel_run))
}
