use brandlens_core::analysis::AnalysisPair;
use brandlens_core::normalize::AnalysisMetrics;
use brandlens_core::types::{DbId, RunId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `analysis_results` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisResult {
    pub id: DbId,
    pub run_id: RunId,
    pub brand_id: DbId,
    pub model: String,
    pub stage: String,
    pub score: f64,
    pub mention_rate: f64,
    pub sentiment_positive: f64,
    pub sentiment_neutral: f64,
    pub sentiment_negative: f64,
    pub average_position: Option<i16>,
    pub response_time_ms: i64,
    pub raw_response: serde_json::Value,
    pub created_at: Timestamp,
}

/// Normalized metrics for one pair, ready to insert.
#[derive(Debug, Clone)]
pub struct NewAnalysisResult {
    pub run_id: RunId,
    pub brand_id: DbId,
    pub pair: AnalysisPair,
    pub metrics: AnalysisMetrics,
    pub raw_response: serde_json::Value,
}

/// Aggregate over a run's results.
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct ResultSummary {
    pub average_score: Option<f64>,
    pub result_count: i64,
}
