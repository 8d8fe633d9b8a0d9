//! Storage seams of the pipeline.
//!
//! [`JobStore`] and [`LockStore`] carry exactly the operations the runner,
//! driver and sweeper need. The Postgres implementations delegate to the
//! `brandlens-db` repositories; tests use in-memory stores behind the same
//! traits.

use std::time::Duration;

use async_trait::async_trait;
use brandlens_core::analysis::AnalysisPair;
use brandlens_core::collaborators::{Brand, Directory, User};
use brandlens_core::error::ExternalError;
use brandlens_core::types::{DbId, RunId, Timestamp};
use brandlens_db::models::analysis_pair::{AnalysisPairRow, PairOutcome};
use brandlens_db::models::analysis_result::{NewAnalysisResult, ResultSummary};
use brandlens_db::models::analysis_run::{AnalysisRun, CreateAnalysisRun};
use brandlens_db::models::maintenance_lock::MaintenanceLock;
use brandlens_db::repositories::{
    AnalysisPairRepo, AnalysisResultRepo, AnalysisRunRepo, BrandRepo, MaintenanceLockRepo,
    UserRepo,
};
use brandlens_db::DbPool;
use uuid::Uuid;

use crate::error::StoreError;

/// PostgreSQL SQLSTATE for unique violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Persistent state of runs, their work units and results.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// `Ok(None)` when the brand already has a running run.
    async fn create_run(&self, input: &CreateAnalysisRun) -> Result<Option<AnalysisRun>, StoreError>;

    async fn find_run(&self, run_id: RunId) -> Result<Option<AnalysisRun>, StoreError>;

    async fn find_running_run(&self, brand_id: DbId) -> Result<Option<AnalysisRun>, StoreError>;

    async fn list_recent_runs(
        &self,
        brand_id: DbId,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError>;

    async fn list_stale_runs(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError>;

    async fn list_pairs(&self, run_id: RunId) -> Result<Vec<AnalysisPairRow>, StoreError>;

    async fn find_pair(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
    ) -> Result<Option<AnalysisPairRow>, StoreError>;

    async fn claim_pair(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
        token: Uuid,
        reclaim_before: Timestamp,
    ) -> Result<Option<AnalysisPairRow>, StoreError>;

    /// `Ok(false)` when the claim was lost and nothing was written.
    async fn record_outcome(
        &self,
        outcome: &PairOutcome<'_>,
        result: Option<&NewAnalysisResult>,
    ) -> Result<bool, StoreError>;

    async fn result_summary(&self, run_id: RunId) -> Result<ResultSummary, StoreError>;

    async fn mark_resumed(&self, run_id: RunId) -> Result<bool, StoreError>;

    async fn complete_run(
        &self,
        run_id: RunId,
        average_score: Option<f64>,
        result_count: i32,
    ) -> Result<bool, StoreError>;

    async fn fail_run(&self, run_id: RunId, error: &str) -> Result<bool, StoreError>;

    async fn cancel_run(&self, run_id: RunId) -> Result<bool, StoreError>;

    async fn delete_finished_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

/// Named leases with atomic acquisition.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn try_acquire(&self, name: &str, holder_id: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    async fn release(&self, name: &str, holder_id: &str) -> Result<bool, StoreError>;

    async fn extend(&self, name: &str, holder_id: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn find_active(&self, name: &str) -> Result<Option<MaintenanceLock>, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_run(&self, input: &CreateAnalysisRun) -> Result<Option<AnalysisRun>, StoreError> {
        match AnalysisRunRepo::create(&self.pool, input).await {
            Ok(run) => Ok(run),
            // Lost a race the advisory lock should have prevented; the
            // partial unique index still refuses the second running run.
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_run(&self, run_id: RunId) -> Result<Option<AnalysisRun>, StoreError> {
        Ok(AnalysisRunRepo::find_by_id(&self.pool, run_id).await?)
    }

    async fn find_running_run(&self, brand_id: DbId) -> Result<Option<AnalysisRun>, StoreError> {
        Ok(AnalysisRunRepo::find_running_for_brand(&self.pool, brand_id).await?)
    }

    async fn list_recent_runs(
        &self,
        brand_id: DbId,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        Ok(AnalysisRunRepo::list_recent_for_brand(&self.pool, brand_id, limit).await?)
    }

    async fn list_stale_runs(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        Ok(AnalysisRunRepo::list_stale(&self.pool, cutoff, limit).await?)
    }

    async fn list_pairs(&self, run_id: RunId) -> Result<Vec<AnalysisPairRow>, StoreError> {
        Ok(AnalysisPairRepo::list_for_run(&self.pool, run_id).await?)
    }

    async fn find_pair(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
    ) -> Result<Option<AnalysisPairRow>, StoreError> {
        Ok(AnalysisPairRepo::find(&self.pool, run_id, pair).await?)
    }

    async fn claim_pair(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
        token: Uuid,
        reclaim_before: Timestamp,
    ) -> Result<Option<AnalysisPairRow>, StoreError> {
        Ok(AnalysisPairRepo::claim(&self.pool, run_id, pair, token, reclaim_before).await?)
    }

    async fn record_outcome(
        &self,
        outcome: &PairOutcome<'_>,
        result: Option<&NewAnalysisResult>,
    ) -> Result<bool, StoreError> {
        Ok(AnalysisPairRepo::record_outcome(&self.pool, outcome, result).await?)
    }

    async fn result_summary(&self, run_id: RunId) -> Result<ResultSummary, StoreError> {
        Ok(AnalysisResultRepo::summary_for_run(&self.pool, run_id).await?)
    }

    async fn mark_resumed(&self, run_id: RunId) -> Result<bool, StoreError> {
        Ok(AnalysisRunRepo::mark_resumed(&self.pool, run_id).await?)
    }

    async fn complete_run(
        &self,
        run_id: RunId,
        average_score: Option<f64>,
        result_count: i32,
    ) -> Result<bool, StoreError> {
        Ok(AnalysisRunRepo::complete(&self.pool, run_id, average_score, result_count).await?)
    }

    async fn fail_run(&self, run_id: RunId, error: &str) -> Result<bool, StoreError> {
        Ok(AnalysisRunRepo::fail(&self.pool, run_id, error).await?)
    }

    async fn cancel_run(&self, run_id: RunId) -> Result<bool, StoreError> {
        Ok(AnalysisRunRepo::cancel(&self.pool, run_id).await?)
    }

    async fn delete_finished_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(AnalysisRunRepo::delete_finished_before(&self.pool, cutoff).await?)
    }
}

#[derive(Clone)]
pub struct PgLockStore {
    pool: DbPool,
}

impl PgLockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_acquire(
        &self,
        name: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(MaintenanceLockRepo::try_acquire(&self.pool, name, holder_id, ttl).await?)
    }

    async fn release(&self, name: &str, holder_id: &str) -> Result<bool, StoreError> {
        Ok(MaintenanceLockRepo::release(&self.pool, name, holder_id).await?)
    }

    async fn extend(&self, name: &str, holder_id: &str, ttl: Duration) -> Result<bool, StoreError> {
        Ok(MaintenanceLockRepo::extend(&self.pool, name, holder_id, ttl).await?)
    }

    async fn find_active(&self, name: &str) -> Result<Option<MaintenanceLock>, StoreError> {
        Ok(MaintenanceLockRepo::find_active(&self.pool, name).await?)
    }
}

/// Brand and user lookups against the application's own tables.
#[derive(Clone)]
pub struct PgDirectory {
    pool: DbPool,
}

impl PgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DIRECTORY: &str = "directory";

#[async_trait]
impl Directory for PgDirectory {
    async fn find_brand(&self, brand_id: DbId) -> Result<Option<Brand>, ExternalError> {
        BrandRepo::find_by_id(&self.pool, brand_id)
            .await
            .map(|row| row.map(Brand::from))
            .map_err(|e| ExternalError::request(DIRECTORY, e.to_string()))
    }

    async fn find_user(&self, user_id: DbId) -> Result<Option<User>, ExternalError> {
        UserRepo::find_by_id(&self.pool, user_id)
            .await
            .map(|row| row.map(User::from))
            .map_err(|e| ExternalError::request(DIRECTORY, e.to_string()))
    }
}
