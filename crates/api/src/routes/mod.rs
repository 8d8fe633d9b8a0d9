pub mod analysis;
pub mod cron;
pub mod health;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /brands/{brand_id}/analysis/status    current and recent runs (GET)
/// /brands/{brand_id}/analysis/runs      start a run (POST, service token)
/// /analysis/runs/{run_id}/cancel        cancel a run (POST, service token)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/brands/{brand_id}/analysis", analysis::brand_router())
        .nest("/analysis/runs", analysis::run_router())
}
