//! Handlers for brand analysis runs.
//!
//! The status query is read-only. Starting and cancelling runs are
//! service-to-service calls from the outer application and require
//! [`ServiceAuth`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use brandlens_core::analysis;
use brandlens_core::types::{DbId, RunId, Timestamp};
use brandlens_db::models::analysis_run::AnalysisRun;
use brandlens_pipeline::StartRun;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::ServiceAuth;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A run as exposed to the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub id: RunId,
    pub brand_id: DbId,
    pub status: &'static str,
    pub models: Vec<String>,
    pub stages: Vec<String>,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    /// Whole percent of attempted pairs.
    pub progress: i32,
    pub current_task_label: Option<String>,
    pub average_score: Option<f64>,
    pub result_count: i32,
    pub error_message: Option<String>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<AnalysisRun> for RunView {
    fn from(run: AnalysisRun) -> Self {
        let progress = if run.total_tasks > 0 {
            run.completed_tasks * 100 / run.total_tasks
        } else {
            0
        };
        Self {
            id: run.id,
            brand_id: run.brand_id,
            status: run.status().map_or("unknown", |s| s.as_str()),
            models: run.models,
            stages: run.stages,
            total_tasks: run.total_tasks,
            completed_tasks: run.completed_tasks,
            progress,
            current_task_label: run.current_task_label,
            average_score: run.average_score,
            result_count: run.result_count,
            error_message: run.error_message,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatusResponse {
    pub is_running: bool,
    pub current_run: Option<RunView>,
    pub recent_runs: Vec<RunView>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/brands/{brand_id}/analysis/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(brand_id): Path<DbId>,
) -> AppResult<Json<AnalysisStatusResponse>> {
    let status = state
        .pipeline
        .driver
        .status(brand_id, state.pipeline.config.recent_runs_limit)
        .await?;

    Ok(Json(AnalysisStatusResponse {
        is_running: status.is_running,
        current_run: status.current_run.map(RunView::from),
        recent_runs: status.recent_runs.into_iter().map(RunView::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Start / cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub user_id: DbId,
    pub models: Vec<String>,
    pub stages: Vec<String>,
}

/// POST /api/v1/brands/{brand_id}/analysis/runs
///
/// Start a run over every selected `(model, stage)` pair. Returns 201 with
/// the created run, or 409 if the brand already has one running.
pub async fn start_run(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(brand_id): Path<DbId>,
    Json(input): Json<StartRunRequest>,
) -> AppResult<impl IntoResponse> {
    let models = analysis::parse_models(&input.models)?;
    let stages = analysis::parse_stages(&input.stages)?;

    let run = state
        .pipeline
        .driver
        .start(StartRun {
            brand_id,
            user_id: input.user_id,
            models,
            stages,
        })
        .await?;

    tracing::info!(run_id = %run.id, brand_id, user_id = input.user_id, "Analysis run started");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RunView::from(run),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub run_id: RunId,
    /// `false` when the run had already finished.
    pub cancelled: bool,
}

/// POST /api/v1/analysis/runs/{run_id}/cancel
pub async fn cancel_run(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<Json<DataResponse<CancelResponse>>> {
    let cancelled = state.pipeline.driver.cancel(run_id).await?;
    Ok(Json(DataResponse {
        data: CancelResponse { run_id, cancelled },
    }))
}
