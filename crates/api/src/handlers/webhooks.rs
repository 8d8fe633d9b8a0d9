//! Handlers for the dispatcher's webhook deliveries.
//!
//! The signature is checked against the raw body before it is parsed. A
//! 2xx tells the dispatcher the delivery is done; storage and upstream
//! failures answer 5xx so the message is redelivered.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use brandlens_core::dispatch::{DispatchMessage, ResumeMessage};
use brandlens_core::types::RunId;
use brandlens_pipeline::{Advance, ResumeOutcome, TaskOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::verify_signature;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub run_id: RunId,
    pub outcome: &'static str,
}

fn task_outcome_label(outcome: TaskOutcome) -> &'static str {
    match outcome {
        TaskOutcome::Completed => "completed",
        TaskOutcome::Failed => "failed",
        TaskOutcome::Duplicate => "duplicate",
        TaskOutcome::InFlight => "in_flight",
        TaskOutcome::Skipped => "skipped",
    }
}

fn resume_outcome_label(outcome: ResumeOutcome) -> &'static str {
    match outcome {
        ResumeOutcome::Ran(task) => task_outcome_label(task),
        ResumeOutcome::Finalized(Advance::Completed) => "finalized",
        ResumeOutcome::Finalized(Advance::Dispatched(_)) => "dispatched",
        ResumeOutcome::Finalized(Advance::AlreadyFinished) | ResumeOutcome::Skipped => "skipped",
    }
}

fn parse_signed<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<T> {
    verify_signature(headers, body, &state.config.dispatch_signing_secret)?;
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid message: {e}")))
}

/// POST /webhooks/analysis/dispatch
///
/// Execute one pair and hand the rest of the worklist to the driver.
pub async fn dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookResponse>> {
    let message: DispatchMessage = parse_signed(&state, &headers, &body)?;
    tracing::debug!(
        run_id = %message.run_id,
        pair = %message.current_pair,
        remaining = message.remaining_pairs.len(),
        "Dispatch received"
    );

    let outcome = state
        .pipeline
        .runner
        .run(message.run_id, message.current_pair, message.remaining_pairs)
        .await?;

    Ok(Json(WebhookResponse {
        run_id: message.run_id,
        outcome: task_outcome_label(outcome),
    }))
}

/// POST /webhooks/analysis/resume
///
/// Reload the run and continue from its first incomplete pair.
pub async fn resume(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookResponse>> {
    let message: ResumeMessage = parse_signed(&state, &headers, &body)?;
    tracing::info!(run_id = %message.run_id, "Resume received");

    let outcome = state.pipeline.runner.resume(message.run_id).await?;

    Ok(Json(WebhookResponse {
        run_id: message.run_id,
        outcome: resume_outcome_label(outcome),
    }))
}
