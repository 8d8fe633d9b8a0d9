//! Detection and recovery of stuck runs.
//!
//! A run is stuck when it is still `running` but nothing has happened to it
//! for longer than the staleness threshold: a dispatch was lost, or an
//! invocation died between claiming a pair and handing off. The sweep is
//! triggered externally (cron) and guarded by a maintenance lock so that
//! concurrent triggers never recover the same run twice.

use std::sync::Arc;

use brandlens_db::models::analysis_run::AnalysisRun;
use chrono::Utc;

use crate::config::PipelineConfig;
use crate::driver::PipelineDriver;
use crate::error::PipelineError;
use crate::lock::LockService;
use crate::resume::remaining_pairs;
use crate::store::JobStore;

/// Name of the maintenance lock held for the duration of a sweep.
pub const SWEEP_LOCK_NAME: &str = "stuck-analysis-sweep";

/// What happened to one stuck run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Resumed,
    Abandoned,
    /// Finished between listing and recovery.
    NotRunning,
}

#[derive(Clone)]
pub struct StuckRunSweeper {
    store: Arc<dyn JobStore>,
    locks: LockService,
    driver: Arc<PipelineDriver>,
    config: PipelineConfig,
}

impl StuckRunSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        locks: LockService,
        driver: Arc<PipelineDriver>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            locks,
            driver,
            config,
        }
    }

    /// Recover a batch of stuck runs. Returns how many were resumed or
    /// abandoned; `0` when another instance holds the sweep lock.
    pub async fn sweep(&self) -> usize {
        let Some(holder_id) = self
            .locks
            .acquire(SWEEP_LOCK_NAME, self.config.sweep_lock_ttl)
            .await
        else {
            tracing::info!("Stuck-run sweep already in progress elsewhere, skipping");
            return 0;
        };

        // The batch runs on its own task so a panic inside it still ends
        // up here and the lock is released.
        let batch = {
            let sweeper = self.clone();
            let holder_id = holder_id.clone();
            tokio::spawn(async move { sweeper.process_batch(&holder_id).await })
        };
        let processed = match batch.await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::error!(error = %e, "Stuck-run sweep aborted");
                0
            }
        };

        self.locks.release(SWEEP_LOCK_NAME, &holder_id).await;
        processed
    }

    async fn process_batch(&self, holder_id: &str) -> usize {
        let cutoff = Utc::now() - self.config.stale_threshold();
        let runs = match self
            .store
            .list_stale_runs(cutoff, self.config.sweep_batch_size)
            .await
        {
            Ok(runs) => runs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list stale runs");
                return 0;
            }
        };
        if runs.is_empty() {
            tracing::debug!("No stuck runs");
            return 0;
        }
        tracing::info!(count = runs.len(), "Recovering stuck runs");

        let mut processed = 0;
        for (index, run) in runs.iter().enumerate() {
            if index > 0
                && !self
                    .locks
                    .extend(SWEEP_LOCK_NAME, holder_id, self.config.sweep_lock_ttl)
                    .await
            {
                tracing::warn!(holder_id, "Sweep lock lost mid-batch, stopping");
                break;
            }

            match self.recover(run).await {
                Ok(Recovery::Resumed | Recovery::Abandoned) => processed += 1,
                Ok(Recovery::NotRunning) => {}
                Err(e) => {
                    tracing::error!(run_id = %run.id, error = %e, "Failed to recover stuck run");
                }
            }
        }
        processed
    }

    async fn recover(&self, run: &AnalysisRun) -> Result<Recovery, PipelineError> {
        if run.resume_count >= self.config.max_resume_attempts {
            let message = format!(
                "Analysis stalled and was abandoned after {} resume attempts",
                run.resume_count
            );
            return Ok(if self.driver.fail(run.id, &message).await? {
                Recovery::Abandoned
            } else {
                Recovery::NotRunning
            });
        }

        let rows = self.store.list_pairs(run.id).await?;
        let remaining = remaining_pairs(run, &rows)?;

        if !self.store.mark_resumed(run.id).await? {
            return Ok(Recovery::NotRunning);
        }
        tracing::info!(
            run_id = %run.id,
            remaining = remaining.len(),
            resume_count = run.resume_count + 1,
            idle_since = %run.last_activity_at(),
            "Resuming stuck run"
        );

        self.driver.advance(run.id, remaining).await?;
        Ok(Recovery::Resumed)
    }
}
