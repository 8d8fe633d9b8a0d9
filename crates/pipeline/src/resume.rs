//! Worklist reconstruction and direct resumption of a run.

use std::collections::HashMap;

use brandlens_core::analysis::AnalysisPair;
use brandlens_core::error::CoreError;
use brandlens_core::types::RunId;
use brandlens_db::models::analysis_pair::AnalysisPairRow;
use brandlens_db::models::analysis_run::AnalysisRun;

use crate::driver::Advance;
use crate::error::PipelineError;
use crate::runner::{TaskOutcome, TaskRunner};

/// What [`TaskRunner::resume`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The first incomplete pair was executed.
    Ran(TaskOutcome),
    /// Nothing was left to run; the driver finalized.
    Finalized(Advance),
    /// The run is no longer running.
    Skipped,
}

/// Pairs of `run` that are not yet finished, in worklist order.
///
/// The order comes from the run's stored model and stage selection, the
/// same ordering used when the run was created. A pair without a work-unit
/// row counts as not finished.
pub fn remaining_pairs(
    run: &AnalysisRun,
    rows: &[AnalysisPairRow],
) -> Result<Vec<AnalysisPair>, CoreError> {
    let mut finished: HashMap<AnalysisPair, bool> = HashMap::with_capacity(rows.len());
    for row in rows {
        finished.insert(row.pair()?, row.is_finished());
    }

    Ok(run
        .pairs()?
        .into_iter()
        .filter(|pair| !finished.get(pair).copied().unwrap_or(false))
        .collect())
}

impl TaskRunner {
    /// Reload `run_id` and continue from its first incomplete pair.
    pub async fn resume(&self, run_id: RunId) -> Result<ResumeOutcome, PipelineError> {
        let run = self
            .store
            .find_run(run_id)
            .await?
            .ok_or_else(|| CoreError::run_not_found(run_id))?;
        if !run.is_running() {
            return Ok(ResumeOutcome::Skipped);
        }

        let rows = self.store.list_pairs(run_id).await?;
        let mut remaining = remaining_pairs(&run, &rows)?;
        tracing::info!(run_id = %run_id, remaining = remaining.len(), "Resuming run");

        if remaining.is_empty() {
            let advance = self.driver.advance(run_id, remaining).await?;
            return Ok(ResumeOutcome::Finalized(advance));
        }

        let head = remaining.remove(0);
        let outcome = self.run(run_id, head, remaining).await?;
        Ok(ResumeOutcome::Ran(outcome))
    }
}
