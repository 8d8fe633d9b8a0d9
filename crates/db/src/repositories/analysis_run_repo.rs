//! Repository for the `analysis_runs` table.
//!
//! Every terminal transition is conditional on the run still being
//! `running`; the boolean return tells the caller whether it won the
//! transition, so completion side effects happen exactly once.

use brandlens_core::types::{DbId, RunId, Timestamp};
use sqlx::PgPool;

use crate::models::analysis_run::{AnalysisRun, CreateAnalysisRun};
use crate::models::status::RunStatus;

/// Column list for `analysis_runs` queries.
const COLUMNS: &str = "\
    id, brand_id, user_id, status_id, models, stages, \
    total_tasks, completed_tasks, current_task_label, \
    average_score, result_count, resume_count, error_message, \
    started_at, last_progress_at, completed_at, created_at, updated_at";

pub struct AnalysisRunRepo;

impl AnalysisRunRepo {
    /// Create a running run and its pending work units in one transaction.
    ///
    /// Returns `None` when the brand already has a running run. Concurrent
    /// creators for the same brand are serialized by a transaction-scoped
    /// advisory lock; the partial unique index
    /// `uq_analysis_runs_brand_running` backs this up.
    pub async fn create(
        pool: &PgPool,
        input: &CreateAnalysisRun,
    ) -> Result<Option<AnalysisRun>, sqlx::Error> {
        let pairs = input.pairs();
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(input.brand_id)
            .execute(&mut *tx)
            .await?;

        let existing: Option<(RunId,)> =
            sqlx::query_as("SELECT id FROM analysis_runs WHERE brand_id = $1 AND status_id = $2")
                .bind(input.brand_id)
                .bind(RunStatus::Running.id())
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Ok(None);
        }

        let models: Vec<String> = input.models.iter().map(|m| m.to_string()).collect();
        let stages: Vec<String> = input.stages.iter().map(|s| s.to_string()).collect();

        let query = format!(
            "INSERT INTO analysis_runs \
                 (id, brand_id, user_id, status_id, models, stages, total_tasks, current_task_label) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'Starting') \
             RETURNING {COLUMNS}"
        );
        let run = sqlx::query_as::<_, AnalysisRun>(&query)
            .bind(input.id)
            .bind(input.brand_id)
            .bind(input.user_id)
            .bind(RunStatus::Running.id())
            .bind(&models)
            .bind(&stages)
            .bind(pairs.len() as i32)
            .fetch_one(&mut *tx)
            .await?;

        let positions: Vec<i16> = (0..pairs.len() as i16).collect();
        let pair_models: Vec<String> = pairs.iter().map(|p| p.model.to_string()).collect();
        let pair_stages: Vec<String> = pairs.iter().map(|p| p.stage.to_string()).collect();

        sqlx::query(
            "INSERT INTO analysis_pairs (run_id, position, model, stage) \
             SELECT $1, p.position, p.model, p.stage \
             FROM UNNEST($2::SMALLINT[], $3::TEXT[], $4::TEXT[]) AS p(position, model, stage)",
        )
        .bind(input.id)
        .bind(&positions)
        .bind(&pair_models)
        .bind(&pair_stages)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(run))
    }

    pub async fn find_by_id(pool: &PgPool, id: RunId) -> Result<Option<AnalysisRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analysis_runs WHERE id = $1");
        sqlx::query_as::<_, AnalysisRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_running_for_brand(
        pool: &PgPool,
        brand_id: DbId,
    ) -> Result<Option<AnalysisRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_runs \
             WHERE brand_id = $1 AND status_id = $2 \
             ORDER BY started_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, AnalysisRun>(&query)
            .bind(brand_id)
            .bind(RunStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Most recent runs for a brand, newest first, any status.
    pub async fn list_recent_for_brand(
        pool: &PgPool,
        brand_id: DbId,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_runs \
             WHERE brand_id = $1 \
             ORDER BY started_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, AnalysisRun>(&query)
            .bind(brand_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Running runs with no activity since `cutoff`, oldest activity first.
    pub async fn list_stale(
        pool: &PgPool,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_runs \
             WHERE status_id = $1 AND COALESCE(last_progress_at, started_at) < $2 \
             ORDER BY COALESCE(last_progress_at, started_at) ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, AnalysisRun>(&query)
            .bind(RunStatus::Running.id())
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Record a resumption attempt. Also counts as activity, so the run is
    /// not picked up again by the next sweep.
    pub async fn mark_resumed(pool: &PgPool, id: RunId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysis_runs \
             SET resume_count = resume_count + 1, last_progress_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(RunStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a running run to `completed` with its result summary.
    pub async fn complete(
        pool: &PgPool,
        id: RunId,
        average_score: Option<f64>,
        result_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysis_runs \
             SET status_id = $2, average_score = $3, result_count = $4, \
                 current_task_label = NULL, completed_at = NOW(), last_progress_at = NOW() \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(RunStatus::Completed.id())
        .bind(average_score)
        .bind(result_count)
        .bind(RunStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a running run to `failed`.
    pub async fn fail(pool: &PgPool, id: RunId, error: &str) -> Result<bool, sqlx::Error> {
        Self::finish(pool, id, RunStatus::Failed, Some(error)).await
    }

    /// Move a running run to `cancelled`.
    pub async fn cancel(pool: &PgPool, id: RunId) -> Result<bool, sqlx::Error> {
        Self::finish(pool, id, RunStatus::Cancelled, None).await
    }

    async fn finish(
        pool: &PgPool,
        id: RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysis_runs \
             SET status_id = $2, error_message = $3, \
                 current_task_label = NULL, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(status.id())
        .bind(error)
        .bind(RunStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete finished runs (and, by cascade, their pairs and results)
    /// that ended before `cutoff`. Running runs are never touched.
    pub async fn delete_finished_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM analysis_runs WHERE status_id <> $1 AND completed_at < $2",
        )
        .bind(RunStatus::Running.id())
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
