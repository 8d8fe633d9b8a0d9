use axum::routing::get;
use axum::Router;

use crate::handlers::cron;
use crate::state::AppState;

/// Scheduler-triggered maintenance, mounted at the root.
///
/// ```text
/// GET|POST /cron/stuck-runs -> sweep_stuck_runs
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/cron/stuck-runs",
        get(cron::sweep_stuck_runs).post(cron::sweep_stuck_runs),
    )
}
