//! Analysis run entity and creation DTO.

use brandlens_core::analysis::{self, AiModel, AnalysisPair, PipelineStage};
use brandlens_core::error::CoreError;
use brandlens_core::types::{DbId, RunId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{RunStatus, StatusId};

/// A row from the `analysis_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisRun {
    pub id: RunId,
    pub brand_id: DbId,
    pub user_id: DbId,
    pub status_id: StatusId,
    pub models: Vec<String>,
    pub stages: Vec<String>,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub current_task_label: Option<String>,
    pub average_score: Option<f64>,
    pub result_count: i32,
    pub resume_count: i32,
    pub error_message: Option<String>,
    pub started_at: Timestamp,
    pub last_progress_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AnalysisRun {
    /// Decoded status; `None` only if the lookup table grew a new row.
    pub fn status(&self) -> Option<RunStatus> {
        RunStatus::from_id(self.status_id)
    }

    pub fn is_running(&self) -> bool {
        self.status_id == RunStatus::Running.id()
    }

    /// Time of the last observable activity on the run.
    pub fn last_activity_at(&self) -> Timestamp {
        self.last_progress_at.unwrap_or(self.started_at)
    }

    /// Rebuild the run's full worklist from its stored selection.
    pub fn pairs(&self) -> Result<Vec<AnalysisPair>, CoreError> {
        let models = analysis::parse_models(&self.models)?;
        let stages = analysis::parse_stages(&self.stages)?;
        Ok(analysis::build_pairs(&models, &stages))
    }
}

/// Input for creating a run together with its work units.
#[derive(Debug, Clone)]
pub struct CreateAnalysisRun {
    pub id: RunId,
    pub brand_id: DbId,
    pub user_id: DbId,
    pub models: Vec<AiModel>,
    pub stages: Vec<PipelineStage>,
}

impl CreateAnalysisRun {
    pub fn pairs(&self) -> Vec<AnalysisPair> {
        analysis::build_pairs(&self.models, &self.stages)
    }
}
