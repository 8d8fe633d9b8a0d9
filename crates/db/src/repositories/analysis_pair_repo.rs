//! Repository for the `analysis_pairs` table.
//!
//! A pair is executed by whoever holds its `claim_token`. Claiming flips
//! `pending` to `running` in a single conditional UPDATE, so two concurrent
//! deliveries of the same dispatch cannot both win. The terminal write is
//! guarded by the same token and commits the pair status, the result row
//! and the run's progress together. Progress is only counted on runs that
//! are still `running`.

use brandlens_core::analysis::AnalysisPair;
use brandlens_core::types::{RunId, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::analysis_pair::{AnalysisPairRow, PairOutcome};
use crate::models::analysis_result::NewAnalysisResult;
use crate::models::status::{PairStatus, RunStatus};
use crate::repositories::AnalysisResultRepo;

/// Column list for `analysis_pairs` queries.
const COLUMNS: &str = "\
    id, run_id, position, model, stage, status_id, claim_token, attempts, \
    error_message, started_at, completed_at, created_at, updated_at";

pub struct AnalysisPairRepo;

impl AnalysisPairRepo {
    /// All pairs of a run in worklist order.
    pub async fn list_for_run(
        pool: &PgPool,
        run_id: RunId,
    ) -> Result<Vec<AnalysisPairRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_pairs WHERE run_id = $1 ORDER BY position ASC"
        );
        sqlx::query_as::<_, AnalysisPairRow>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find(
        pool: &PgPool,
        run_id: RunId,
        pair: AnalysisPair,
    ) -> Result<Option<AnalysisPairRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_pairs \
             WHERE run_id = $1 AND model = $2 AND stage = $3"
        );
        sqlx::query_as::<_, AnalysisPairRow>(&query)
            .bind(run_id)
            .bind(pair.model.as_str())
            .bind(pair.stage.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Claim a pair for execution under `token`.
    ///
    /// Succeeds for a `pending` pair, or for a `running` pair whose claim
    /// started before `reclaim_before` (its executor is presumed dead).
    /// Returns `None` if someone else holds a live claim or the pair is
    /// already finished.
    pub async fn claim(
        pool: &PgPool,
        run_id: RunId,
        pair: AnalysisPair,
        token: Uuid,
        reclaim_before: Timestamp,
    ) -> Result<Option<AnalysisPairRow>, sqlx::Error> {
        let query = format!(
            "UPDATE analysis_pairs \
             SET status_id = $4, claim_token = $5, attempts = attempts + 1, \
                 started_at = NOW(), error_message = NULL \
             WHERE run_id = $1 AND model = $2 AND stage = $3 \
               AND (status_id = $6 OR (status_id = $4 AND started_at < $7)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnalysisPairRow>(&query)
            .bind(run_id)
            .bind(pair.model.as_str())
            .bind(pair.stage.as_str())
            .bind(PairStatus::Running.id())
            .bind(token)
            .bind(PairStatus::Pending.id())
            .bind(reclaim_before)
            .fetch_optional(pool)
            .await
    }

    /// Commit the outcome of a claimed execution.
    ///
    /// In one transaction: finish the pair (only if `outcome.claim_token`
    /// still holds the claim), insert the result if there is one, and bump
    /// the run's progress. Returns `false` and writes nothing when the
    /// claim was lost.
    pub async fn record_outcome(
        pool: &PgPool,
        outcome: &PairOutcome<'_>,
        result: Option<&NewAnalysisResult>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let finished = sqlx::query(
            "UPDATE analysis_pairs \
             SET status_id = $4, error_message = $5, completed_at = NOW(), claim_token = NULL \
             WHERE run_id = $1 AND model = $2 AND stage = $3 \
               AND status_id = $6 AND claim_token = $7",
        )
        .bind(outcome.run_id)
        .bind(outcome.pair.model.as_str())
        .bind(outcome.pair.stage.as_str())
        .bind(outcome.status.id())
        .bind(outcome.error_message)
        .bind(PairStatus::Running.id())
        .bind(outcome.claim_token)
        .execute(&mut *tx)
        .await?;

        if finished.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(result) = result {
            AnalysisResultRepo::insert(&mut *tx, result).await?;
        }

        sqlx::query(
            "UPDATE analysis_runs \
             SET completed_tasks = LEAST(completed_tasks + 1, total_tasks), \
                 current_task_label = $2, last_progress_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(outcome.run_id)
        .bind(outcome.pair.label())
        .bind(RunStatus::Running.id())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
