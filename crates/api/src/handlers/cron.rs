use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::middleware::auth::CronAuth;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub processed: usize,
    pub execution_time_ms: u64,
}

/// GET|POST /cron/stuck-runs
///
/// Recover stuck runs. Lock contention is not an error: another instance is
/// already sweeping and `processed` is 0.
pub async fn sweep_stuck_runs(_auth: CronAuth, State(state): State<AppState>) -> Json<SweepResponse> {
    let started = Instant::now();
    let processed = state.pipeline.sweeper.sweep().await;
    let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    tracing::info!(processed, execution_time_ms, "Stuck-run sweep finished");

    Json(SweepResponse {
        processed,
        execution_time_ms,
    })
}
