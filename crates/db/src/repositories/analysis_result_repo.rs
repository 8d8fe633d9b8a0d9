//! Repository for the `analysis_results` table.

use brandlens_core::types::RunId;
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;

use crate::models::analysis_result::{AnalysisResult, NewAnalysisResult, ResultSummary};

/// Column list for `analysis_results` queries.
const COLUMNS: &str = "\
    id, run_id, brand_id, model, stage, score, mention_rate, \
    sentiment_positive, sentiment_neutral, sentiment_negative, \
    average_position, response_time_ms, raw_response, created_at";

pub struct AnalysisResultRepo;

impl AnalysisResultRepo {
    /// Insert a result. A second result for the same `(run, model, stage)`
    /// is ignored and yields `None`.
    ///
    /// Takes any executor so it can join the caller's transaction.
    pub async fn insert<'e, E>(
        executor: E,
        input: &NewAnalysisResult,
    ) -> Result<Option<AnalysisResult>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let metrics = &input.metrics;
        let query = format!(
            "INSERT INTO analysis_results \
                 (run_id, brand_id, model, stage, score, mention_rate, \
                  sentiment_positive, sentiment_neutral, sentiment_negative, \
                  average_position, response_time_ms, raw_response) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (run_id, model, stage) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnalysisResult>(&query)
            .bind(input.run_id)
            .bind(input.brand_id)
            .bind(input.pair.model.as_str())
            .bind(input.pair.stage.as_str())
            .bind(metrics.score)
            .bind(metrics.mention_rate)
            .bind(metrics.sentiment.positive)
            .bind(metrics.sentiment.neutral)
            .bind(metrics.sentiment.negative)
            .bind(metrics.average_position)
            .bind(metrics.response_time_ms)
            .bind(&input.raw_response)
            .fetch_optional(executor)
            .await
    }

    pub async fn list_for_run(
        pool: &PgPool,
        run_id: RunId,
    ) -> Result<Vec<AnalysisResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_results WHERE run_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, AnalysisResult>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    /// Mean score and count over a run's results.
    pub async fn summary_for_run(
        pool: &PgPool,
        run_id: RunId,
    ) -> Result<ResultSummary, sqlx::Error> {
        sqlx::query_as::<_, ResultSummary>(
            "SELECT AVG(score) AS average_score, COUNT(*) AS result_count \
             FROM analysis_results WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_one(pool)
        .await
    }
}
