//! Work-unit rows: one per `(run, model, stage)`.

use brandlens_core::analysis::AnalysisPair;
use brandlens_core::error::CoreError;
use brandlens_core::types::{DbId, RunId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::status::{PairStatus, StatusId};

/// A row from the `analysis_pairs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisPairRow {
    pub id: DbId,
    pub run_id: RunId,
    pub position: i16,
    pub model: String,
    pub stage: String,
    pub status_id: StatusId,
    #[serde(skip)]
    pub claim_token: Option<Uuid>,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AnalysisPairRow {
    pub fn status(&self) -> Option<PairStatus> {
        PairStatus::from_id(self.status_id)
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_some_and(PairStatus::is_finished)
    }

    pub fn pair(&self) -> Result<AnalysisPair, CoreError> {
        Ok(AnalysisPair::new(self.model.parse()?, self.stage.parse()?))
    }
}

/// Terminal result of one claimed execution, written in a single transaction.
#[derive(Debug, Clone)]
pub struct PairOutcome<'a> {
    pub run_id: RunId,
    pub pair: AnalysisPair,
    pub claim_token: Uuid,
    pub status: PairStatus,
    pub error_message: Option<&'a str>,
}
