//! Run lifecycle and worklist hand-off.
//!
//! The driver is the trampoline of the pipeline: every invocation of the
//! task runner ends by giving the driver what is left of the worklist, and
//! the driver either dispatches the next pair through the external
//! dispatcher or, when nothing is left, finalizes the run. It never calls
//! an analysis provider itself.
//!
//! Terminal transitions go through conditional writes on the run row; only
//! the caller that wins the transition sends the notification.

use std::sync::Arc;

use brandlens_core::analysis::{self, AiModel, AnalysisPair, PipelineStage};
use brandlens_core::collaborators::{Directory, Dispatcher, Notifier};
use brandlens_core::dispatch::DispatchMessage;
use brandlens_core::error::CoreError;
use brandlens_core::types::{DbId, RunId};
use brandlens_db::models::analysis_run::{AnalysisRun, CreateAnalysisRun};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::store::JobStore;

/// What [`PipelineDriver::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The pair was handed to the dispatcher.
    Dispatched(AnalysisPair),
    /// The run was completed by this call (and the user notified).
    Completed,
    /// The run was already terminal; nothing happened.
    AlreadyFinished,
}

/// Input for starting a run.
#[derive(Debug, Clone)]
pub struct StartRun {
    pub brand_id: DbId,
    pub user_id: DbId,
    pub models: Vec<AiModel>,
    pub stages: Vec<PipelineStage>,
}

/// A brand's analysis state as reported to the outer application.
#[derive(Debug, Clone)]
pub struct BrandAnalysisStatus {
    pub is_running: bool,
    pub current_run: Option<AnalysisRun>,
    pub recent_runs: Vec<AnalysisRun>,
}

enum Notification<'a> {
    Completed {
        average_score: Option<f64>,
        result_count: i64,
    },
    Failed {
        error: &'a str,
    },
}

pub struct PipelineDriver {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn Dispatcher>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn Directory>,
}

impl PipelineDriver {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn Dispatcher>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            directory,
        }
    }

    /// Create a run with every pair pending and dispatch the first pair.
    ///
    /// If the first dispatch fails the run is failed right away, since no
    /// invocation would ever pick it up before the stuck-run sweep.
    pub async fn start(&self, input: StartRun) -> Result<AnalysisRun, PipelineError> {
        analysis::validate_selection(&input.models, &input.stages)?;

        if self.directory.find_brand(input.brand_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "Brand",
                id: input.brand_id.to_string(),
            }
            .into());
        }
        if self.directory.find_user(input.user_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "User",
                id: input.user_id.to_string(),
            }
            .into());
        }

        let create = CreateAnalysisRun {
            id: Uuid::now_v7(),
            brand_id: input.brand_id,
            user_id: input.user_id,
            models: input.models,
            stages: input.stages,
        };
        let pairs = create.pairs();

        let Some(run) = self.store.create_run(&create).await? else {
            return Err(CoreError::Conflict(format!(
                "Brand {} already has an analysis running",
                input.brand_id
            ))
            .into());
        };

        tracing::info!(
            run_id = %run.id,
            brand_id = run.brand_id,
            total_tasks = run.total_tasks,
            "Analysis run created"
        );

        let Some(message) = DispatchMessage::from_worklist(run.id, &pairs) else {
            return Err(CoreError::Internal("Run created without pairs".into()).into());
        };
        if let Err(e) = self.dispatcher.dispatch(&message).await {
            tracing::error!(run_id = %run.id, error = %e, "Failed to dispatch first pair");
            self.fail(run.id, &format!("Failed to start analysis: {e}")).await?;
            return Err(e.into());
        }

        Ok(run)
    }

    /// Hand the rest of the worklist on: dispatch its head, or finalize the
    /// run when it is empty.
    pub async fn advance(
        &self,
        run_id: RunId,
        remaining: Vec<AnalysisPair>,
    ) -> Result<Advance, PipelineError> {
        match DispatchMessage::from_worklist(run_id, &remaining) {
            Some(message) => {
                self.dispatcher.dispatch(&message).await?;
                Ok(Advance::Dispatched(message.current_pair))
            }
            None => self.finalize(run_id).await,
        }
    }

    /// Complete the run if every pair is terminal.
    ///
    /// If some pair is still incomplete (a hand-off was lost, or the
    /// worklist was stale) the first such pair is re-dispatched instead.
    pub async fn finalize(&self, run_id: RunId) -> Result<Advance, PipelineError> {
        let run = self
            .store
            .find_run(run_id)
            .await?
            .ok_or_else(|| CoreError::run_not_found(run_id))?;
        if !run.is_running() {
            return Ok(Advance::AlreadyFinished);
        }

        let rows = self.store.list_pairs(run_id).await?;
        let incomplete = rows
            .iter()
            .filter(|row| !row.is_finished())
            .map(|row| row.pair())
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(message) = DispatchMessage::from_worklist(run_id, &incomplete) {
            tracing::warn!(
                run_id = %run_id,
                pair = %message.current_pair,
                incomplete = incomplete.len(),
                "Worklist exhausted with incomplete pairs, re-dispatching"
            );
            self.dispatcher.dispatch(&message).await?;
            return Ok(Advance::Dispatched(message.current_pair));
        }

        let summary = self.store.result_summary(run_id).await?;
        let result_count = i32::try_from(summary.result_count).unwrap_or(i32::MAX);
        if !self
            .store
            .complete_run(run_id, summary.average_score, result_count)
            .await?
        {
            return Ok(Advance::AlreadyFinished);
        }

        tracing::info!(
            run_id = %run_id,
            result_count,
            average_score = ?summary.average_score,
            "Analysis run completed"
        );
        self.notify(
            &run,
            Notification::Completed {
                average_score: summary.average_score,
                result_count: summary.result_count,
            },
        )
        .await;
        Ok(Advance::Completed)
    }

    /// Fail a running run and notify its user. Returns whether this call
    /// made the transition.
    pub async fn fail(&self, run_id: RunId, error: &str) -> Result<bool, PipelineError> {
        if !self.store.fail_run(run_id, error).await? {
            return Ok(false);
        }
        tracing::warn!(run_id = %run_id, error, "Analysis run failed");

        if let Some(run) = self.store.find_run(run_id).await? {
            self.notify(&run, Notification::Failed { error }).await;
        }
        Ok(true)
    }

    /// Cancel a running run. Returns `false` if it had already finished.
    pub async fn cancel(&self, run_id: RunId) -> Result<bool, PipelineError> {
        if self.store.find_run(run_id).await?.is_none() {
            return Err(CoreError::run_not_found(run_id).into());
        }
        let cancelled = self.store.cancel_run(run_id).await?;
        if cancelled {
            tracing::info!(run_id = %run_id, "Analysis run cancelled");
        }
        Ok(cancelled)
    }

    pub async fn status(
        &self,
        brand_id: DbId,
        recent_limit: i64,
    ) -> Result<BrandAnalysisStatus, PipelineError> {
        let current_run = self.store.find_running_run(brand_id).await?;
        let recent_runs = self.store.list_recent_runs(brand_id, recent_limit).await?;
        Ok(BrandAnalysisStatus {
            is_running: current_run.is_some(),
            current_run,
            recent_runs,
        })
    }

    /// Notification failures are logged and never fail the run.
    async fn notify(&self, run: &AnalysisRun, notification: Notification<'_>) {
        let user = match self.directory.find_user(run.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(run_id = %run.id, user_id = run.user_id, "Run owner not found, skipping notification");
                return;
            }
            Err(e) => {
                tracing::error!(run_id = %run.id, error = %e, "Failed to load run owner");
                return;
            }
        };
        let brand_name = match self.directory.find_brand(run.brand_id).await {
            Ok(Some(brand)) => brand.name,
            _ => format!("brand #{}", run.brand_id),
        };

        let (subject, body) = render_notification(&brand_name, run, &notification);
        if let Err(e) = self.notifier.send(&user.email, &subject, &body).await {
            tracing::error!(run_id = %run.id, error = %e, "Failed to send run notification");
        }
    }
}

fn render_notification(
    brand_name: &str,
    run: &AnalysisRun,
    notification: &Notification<'_>,
) -> (String, String) {
    match notification {
        Notification::Completed {
            average_score,
            result_count,
        } => {
            let score = average_score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "n/a".into());
            (
                format!("Brand analysis complete: {brand_name}"),
                format!(
                    "Your visibility analysis of {brand_name} has finished.\n\n\
                     Results: {result_count} of {} model/stage pairs\n\
                     Average visibility score: {score}\n",
                    run.total_tasks
                ),
            )
        }
        Notification::Failed { error } => (
            format!("Brand analysis failed: {brand_name}"),
            format!(
                "Your visibility analysis of {brand_name} could not be completed.\n\n\
                 Reason: {error}\n"
            ),
        ),
    }
}
