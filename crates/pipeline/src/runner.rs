//! Execution of a single `(model, stage)` pair.
//!
//! The runner is invoked once per dispatch delivery, and deliveries are
//! at-least-once, so everything here is idempotent with respect to the
//! work unit's terminal state:
//!
//! 1. the run must exist and still be running, otherwise the delivery is
//!    skipped;
//! 2. a finished work unit is a duplicate delivery and is dropped without
//!    side effects;
//! 3. the work unit is claimed atomically, and a refused claim means another
//!    invocation is executing it right now;
//! 4. the terminal write is guarded by the claim token, so only the claim
//!    holder records a result and bumps progress.
//!
//! Only an invocation that recorded an outcome hands the rest of the
//! worklist to the driver.

use std::sync::Arc;

use brandlens_core::analysis::AnalysisPair;
use brandlens_core::collaborators::{AnalysisProvider, Directory};
use brandlens_core::error::CoreError;
use brandlens_core::normalize::{self, ProviderOutput};
use brandlens_core::types::RunId;
use brandlens_db::models::analysis_pair::PairOutcome;
use brandlens_db::models::analysis_result::NewAnalysisResult;
use brandlens_db::models::analysis_run::AnalysisRun;
use brandlens_db::models::status::PairStatus;
use chrono::Utc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::driver::PipelineDriver;
use crate::error::PipelineError;
use crate::store::JobStore;

/// What one runner invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The provider answered and the result was recorded.
    Completed,
    /// The pair failed permanently; the run continues without it.
    Failed,
    /// The pair was already finished by an earlier delivery.
    Duplicate,
    /// Another invocation holds a live claim on the pair.
    InFlight,
    /// The run is missing or no longer running.
    Skipped,
}

impl TaskOutcome {
    /// Whether this invocation recorded an outcome and handed off.
    pub fn handed_off(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

pub struct TaskRunner {
    pub(crate) store: Arc<dyn JobStore>,
    provider: Arc<dyn AnalysisProvider>,
    directory: Arc<dyn Directory>,
    pub(crate) driver: Arc<PipelineDriver>,
    config: PipelineConfig,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn AnalysisProvider>,
        directory: Arc<dyn Directory>,
        driver: Arc<PipelineDriver>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            directory,
            driver,
            config,
        }
    }

    /// Execute `pair` for `run_id`, then hand `remaining` to the driver.
    pub async fn run(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
        remaining: Vec<AnalysisPair>,
    ) -> Result<TaskOutcome, PipelineError> {
        let run = match self.store.find_run(run_id).await? {
            Some(run) if run.is_running() => run,
            Some(run) => {
                tracing::info!(run_id = %run_id, status_id = run.status_id, %pair, "Run no longer running, skipping pair");
                return Ok(TaskOutcome::Skipped);
            }
            None => {
                tracing::warn!(run_id = %run_id, %pair, "Run not found, skipping pair");
                return Ok(TaskOutcome::Skipped);
            }
        };

        match self.execute(&run, pair, remaining).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if matches!(e, PipelineError::Store(_)) && run.completed_tasks == 0 {
                    let message = format!("Analysis could not start: {e}");
                    if let Err(fail_err) = self.driver.fail(run_id, &message).await {
                        tracing::error!(run_id = %run_id, error = %fail_err, "Failed to mark run failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run: &AnalysisRun,
        pair: AnalysisPair,
        remaining: Vec<AnalysisPair>,
    ) -> Result<TaskOutcome, PipelineError> {
        let Some(unit) = self.store.find_pair(run.id, pair).await? else {
            return Err(CoreError::Validation(format!(
                "Pair {pair} is not part of run {}",
                run.id
            ))
            .into());
        };
        if unit.is_finished() {
            tracing::info!(run_id = %run.id, %pair, "Pair already finished, dropping duplicate delivery");
            return Ok(TaskOutcome::Duplicate);
        }

        let token = Uuid::new_v4();
        let reclaim_before = Utc::now() - self.config.stale_threshold();
        let Some(claimed) = self
            .store
            .claim_pair(run.id, pair, token, reclaim_before)
            .await?
        else {
            tracing::info!(run_id = %run.id, %pair, "Pair claimed by another invocation");
            return Ok(TaskOutcome::InFlight);
        };
        tracing::debug!(run_id = %run.id, %pair, attempt = claimed.attempts, "Pair claimed");

        let (outcome, error_message, result) = match self.analyze(run, pair).await {
            Ok(output) => {
                let metrics = normalize::normalize(&output);
                let result = NewAnalysisResult {
                    run_id: run.id,
                    brand_id: run.brand_id,
                    pair,
                    metrics,
                    raw_response: output.raw,
                };
                (TaskOutcome::Completed, None, Some(result))
            }
            Err(message) => {
                tracing::warn!(run_id = %run.id, %pair, error = %message, "Pair analysis failed");
                (TaskOutcome::Failed, Some(message), None)
            }
        };

        let record = PairOutcome {
            run_id: run.id,
            pair,
            claim_token: token,
            status: match outcome {
                TaskOutcome::Completed => PairStatus::Completed,
                _ => PairStatus::Failed,
            },
            error_message: error_message.as_deref(),
        };
        if !self.store.record_outcome(&record, result.as_ref()).await? {
            tracing::info!(run_id = %run.id, %pair, "Claim lost before recording, dropping outcome");
            return Ok(TaskOutcome::Duplicate);
        }

        tracing::info!(
            run_id = %run.id,
            %pair,
            outcome = ?outcome,
            remaining = remaining.len(),
            "Pair finished"
        );

        // A failed hand-off leaves the run without a next delivery; the
        // stuck-run sweep picks it up once it goes stale.
        if let Err(e) = self.driver.advance(run.id, remaining).await {
            tracing::error!(run_id = %run.id, error = %e, "Hand-off to driver failed");
        }
        Ok(outcome)
    }

    /// Call the provider within the configured timeout. Errors are
    /// flattened to the message stored on the work unit.
    async fn analyze(&self, run: &AnalysisRun, pair: AnalysisPair) -> Result<ProviderOutput, String> {
        let brand = match self.directory.find_brand(run.brand_id).await {
            Ok(Some(brand)) => brand,
            Ok(None) => return Err(format!("Brand {} not found", run.brand_id)),
            Err(e) => return Err(e.to_string()),
        };

        let call = self.provider.analyze(&brand, pair.model, pair.stage);
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "Analysis timed out after {:?}",
                self.config.provider_timeout
            )),
        }
    }
}
