//! In-memory stores and collaborators behind the pipeline's traits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use brandlens_core::analysis::{AiModel, AnalysisPair, PipelineStage};
use brandlens_core::collaborators::{
    AnalysisProvider, Brand, Directory, Dispatcher, Notifier, User,
};
use brandlens_core::dispatch::DispatchMessage;
use brandlens_core::error::ExternalError;
use brandlens_core::normalize::ProviderOutput;
use brandlens_core::types::{DbId, RunId, Timestamp};
use brandlens_db::models::analysis_pair::{AnalysisPairRow, PairOutcome};
use brandlens_db::models::analysis_result::{NewAnalysisResult, ResultSummary};
use brandlens_db::models::analysis_run::{AnalysisRun, CreateAnalysisRun};
use brandlens_db::models::maintenance_lock::MaintenanceLock;
use brandlens_db::models::status::{PairStatus, RunStatus};
use brandlens_pipeline::{
    Collaborators, JobStore, LockStore, Pipeline, PipelineConfig, StartRun, StoreError,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

pub const BRAND_ID: DbId = 1;
pub const USER_ID: DbId = 1;
pub const USER_EMAIL: &str = "owner@acme.test";

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected failure".into())
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    runs: HashMap<RunId, AnalysisRun>,
    pairs: Vec<AnalysisPairRow>,
    results: Vec<NewAnalysisResult>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Every operation fails.
    pub unavailable: AtomicBool,
    /// Only `claim_pair` fails.
    pub fail_claims: AtomicBool,
    /// `list_stale_runs` panics.
    pub crash_listing: AtomicBool,
}

impl MemoryStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    pub fn run(&self, run_id: RunId) -> AnalysisRun {
        self.state.lock().unwrap().runs[&run_id].clone()
    }

    pub fn pair(&self, run_id: RunId, pair: AnalysisPair) -> AnalysisPairRow {
        let state = self.state.lock().unwrap();
        find_row(&state.pairs, run_id, pair).unwrap().clone()
    }

    pub fn results(&self, run_id: RunId) -> Vec<NewAnalysisResult> {
        let state = self.state.lock().unwrap();
        state
            .results
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Pretend nothing has happened to the run for `minutes`.
    pub fn backdate(&self, run_id: RunId, minutes: i64) {
        let mut state = self.state.lock().unwrap();
        let past = Utc::now() - chrono::Duration::minutes(minutes);
        let run = state.runs.get_mut(&run_id).unwrap();
        run.started_at = past;
        run.last_progress_at = run.last_progress_at.map(|_| past);
        for row in state.pairs.iter_mut().filter(|r| r.run_id == run_id) {
            row.started_at = row.started_at.map(|_| past);
        }
    }

    pub fn set_resume_count(&self, run_id: RunId, count: i32) {
        self.state
            .lock()
            .unwrap()
            .runs
            .get_mut(&run_id)
            .unwrap()
            .resume_count = count;
    }
}

fn find_row(rows: &[AnalysisPairRow], run_id: RunId, pair: AnalysisPair) -> Option<&AnalysisPairRow> {
    rows.iter().find(|r| {
        r.run_id == run_id && r.model == pair.model.as_str() && r.stage == pair.stage.as_str()
    })
}

fn find_row_mut(
    rows: &mut [AnalysisPairRow],
    run_id: RunId,
    pair: AnalysisPair,
) -> Option<&mut AnalysisPairRow> {
    rows.iter_mut().find(|r| {
        r.run_id == run_id && r.model == pair.model.as_str() && r.stage == pair.stage.as_str()
    })
}

fn finish_run(
    state: &mut State,
    run_id: RunId,
    status: RunStatus,
    error: Option<&str>,
) -> bool {
    match state.runs.get_mut(&run_id) {
        Some(run) if run.is_running() => {
            run.status_id = status.id();
            run.error_message = error.map(str::to_string);
            run.current_task_label = None;
            run.completed_at = Some(Utc::now());
            true
        }
        _ => false,
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_run(&self, input: &CreateAnalysisRun) -> Result<Option<AnalysisRun>, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if state
            .runs
            .values()
            .any(|r| r.brand_id == input.brand_id && r.is_running())
        {
            return Ok(None);
        }

        let now = Utc::now();
        let pairs = input.pairs();
        let run = AnalysisRun {
            id: input.id,
            brand_id: input.brand_id,
            user_id: input.user_id,
            status_id: RunStatus::Running.id(),
            models: input.models.iter().map(|m| m.to_string()).collect(),
            stages: input.stages.iter().map(|s| s.to_string()).collect(),
            total_tasks: pairs.len() as i32,
            completed_tasks: 0,
            current_task_label: Some("Starting".into()),
            average_score: None,
            result_count: 0,
            resume_count: 0,
            error_message: None,
            started_at: now,
            last_progress_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let next_id = state.pairs.len() as i64;
        for (position, pair) in pairs.iter().enumerate() {
            state.pairs.push(AnalysisPairRow {
                id: next_id + position as i64 + 1,
                run_id: input.id,
                position: position as i16,
                model: pair.model.to_string(),
                stage: pair.stage.to_string(),
                status_id: PairStatus::Pending.id(),
                claim_token: None,
                attempts: 0,
                error_message: None,
                started_at: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            });
        }
        state.runs.insert(run.id, run.clone());
        Ok(Some(run))
    }

    async fn find_run(&self, run_id: RunId) -> Result<Option<AnalysisRun>, StoreError> {
        self.check()?;
        Ok(self.state.lock().unwrap().runs.get(&run_id).cloned())
    }

    async fn find_running_run(&self, brand_id: DbId) -> Result<Option<AnalysisRun>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .runs
            .values()
            .find(|r| r.brand_id == brand_id && r.is_running())
            .cloned())
    }

    async fn list_recent_runs(
        &self,
        brand_id: DbId,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let mut runs: Vec<_> = state
            .runs
            .values()
            .filter(|r| r.brand_id == brand_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn list_stale_runs(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        self.check()?;
        if self.crash_listing.load(Ordering::SeqCst) {
            panic!("stale-run listing crashed");
        }
        let state = self.state.lock().unwrap();
        let mut runs: Vec<_> = state
            .runs
            .values()
            .filter(|r| r.is_running() && r.last_activity_at() < cutoff)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.last_activity_at());
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn list_pairs(&self, run_id: RunId) -> Result<Vec<AnalysisPairRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<_> = state
            .pairs
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.position);
        Ok(rows)
    }

    async fn find_pair(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
    ) -> Result<Option<AnalysisPairRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(find_row(&state.pairs, run_id, pair).cloned())
    }

    async fn claim_pair(
        &self,
        run_id: RunId,
        pair: AnalysisPair,
        token: Uuid,
        reclaim_before: Timestamp,
    ) -> Result<Option<AnalysisPairRow>, StoreError> {
        self.check()?;
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut state = self.state.lock().unwrap();
        let Some(row) = find_row_mut(&mut state.pairs, run_id, pair) else {
            return Ok(None);
        };
        let pending = row.status_id == PairStatus::Pending.id();
        let abandoned = row.status_id == PairStatus::Running.id()
            && row.started_at.is_some_and(|t| t < reclaim_before);
        if !(pending || abandoned) {
            return Ok(None);
        }
        row.status_id = PairStatus::Running.id();
        row.claim_token = Some(token);
        row.attempts += 1;
        row.started_at = Some(Utc::now());
        row.error_message = None;
        Ok(Some(row.clone()))
    }

    async fn record_outcome(
        &self,
        outcome: &PairOutcome<'_>,
        result: Option<&NewAnalysisResult>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let Some(row) = find_row_mut(&mut state.pairs, outcome.run_id, outcome.pair) else {
            return Ok(false);
        };
        if row.status_id != PairStatus::Running.id() || row.claim_token != Some(outcome.claim_token)
        {
            return Ok(false);
        }
        row.status_id = outcome.status.id();
        row.error_message = outcome.error_message.map(str::to_string);
        row.completed_at = Some(Utc::now());
        row.claim_token = None;

        if let Some(result) = result {
            let duplicate = state
                .results
                .iter()
                .any(|r| r.run_id == result.run_id && r.pair == result.pair);
            if !duplicate {
                state.results.push(result.clone());
            }
        }

        if let Some(run) = state
            .runs
            .get_mut(&outcome.run_id)
            .filter(|run| run.status_id == RunStatus::Running.id())
        {
            run.completed_tasks = (run.completed_tasks + 1).min(run.total_tasks);
            run.current_task_label = Some(outcome.pair.label());
            run.last_progress_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn result_summary(&self, run_id: RunId) -> Result<ResultSummary, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let scores: Vec<f64> = state
            .results
            .iter()
            .filter(|r| r.run_id == run_id)
            .map(|r| r.metrics.score)
            .collect();
        Ok(ResultSummary {
            average_score: (!scores.is_empty())
                .then(|| scores.iter().sum::<f64>() / scores.len() as f64),
            result_count: scores.len() as i64,
        })
    }

    async fn mark_resumed(&self, run_id: RunId) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        match state.runs.get_mut(&run_id) {
            Some(run) if run.is_running() => {
                run.resume_count += 1;
                run.last_progress_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_run(
        &self,
        run_id: RunId,
        average_score: Option<f64>,
        result_count: i32,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let won = finish_run(&mut state, run_id, RunStatus::Completed, None);
        if won {
            let run = state.runs.get_mut(&run_id).unwrap();
            run.average_score = average_score;
            run.result_count = result_count;
        }
        Ok(won)
    }

    async fn fail_run(&self, run_id: RunId, error: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(finish_run(&mut state, run_id, RunStatus::Failed, Some(error)))
    }

    async fn cancel_run(&self, run_id: RunId) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(finish_run(&mut state, run_id, RunStatus::Cancelled, None))
    }

    async fn delete_finished_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let before = state.runs.len();
        state
            .runs
            .retain(|_, r| r.is_running() || r.completed_at.map_or(true, |t| t >= cutoff));
        Ok((before - state.runs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryLocks
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLocks {
    locks: Mutex<HashMap<String, MaintenanceLock>>,
    pub unavailable: AtomicBool,
}

impl MemoryLocks {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Plant a lock held by someone else.
    pub fn hold(&self, name: &str, holder_id: &str, ttl: Duration) {
        let now = Utc::now();
        self.locks.lock().unwrap().insert(
            name.to_string(),
            MaintenanceLock {
                name: name.to_string(),
                holder_id: holder_id.to_string(),
                acquired_at: now,
                expires_at: now + chrono::Duration::from_std(ttl).unwrap(),
            },
        );
    }

    pub fn expire(&self, name: &str) {
        if let Some(lock) = self.locks.lock().unwrap().get_mut(name) {
            lock.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.locks
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(|l| l.expires_at > Utc::now())
    }
}

#[async_trait]
impl LockStore for MemoryLocks {
    async fn try_acquire(
        &self,
        name: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut locks = self.locks.lock().unwrap();
        let now = Utc::now();
        if locks.get(name).is_some_and(|l| l.expires_at > now) {
            return Ok(false);
        }
        locks.insert(
            name.to_string(),
            MaintenanceLock {
                name: name.to_string(),
                holder_id: holder_id.to_string(),
                acquired_at: now,
                expires_at: now + chrono::Duration::from_std(ttl).unwrap(),
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, holder_id: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut locks = self.locks.lock().unwrap();
        if locks.get(name).is_some_and(|l| l.holder_id == holder_id) {
            locks.remove(name);
            return Ok(true);
        }
        Ok(false)
    }

    async fn extend(&self, name: &str, holder_id: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check()?;
        let mut locks = self.locks.lock().unwrap();
        let now = Utc::now();
        match locks.get_mut(name) {
            Some(lock) if lock.holder_id == holder_id && lock.expires_at > now => {
                lock.expires_at = now + chrono::Duration::from_std(ttl).unwrap();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_active(&self, name: &str) -> Result<Option<MaintenanceLock>, StoreError> {
        self.check()?;
        let locks = self.locks.lock().unwrap();
        Ok(locks
            .get(name)
            .filter(|l| l.expires_at > Utc::now())
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Answers every pair with a fixed score unless told otherwise.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<HashMap<AnalysisPair, Result<Value, String>>>,
    calls: Mutex<Vec<AnalysisPair>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedProvider {
    pub fn respond(&self, pair: AnalysisPair, raw: Value) {
        self.responses.lock().unwrap().insert(pair, Ok(raw));
    }

    pub fn fail(&self, pair: AnalysisPair, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(pair, Err(message.to_string()));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<AnalysisPair> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    async fn analyze(
        &self,
        _brand: &Brand,
        model: AiModel,
        stage: PipelineStage,
    ) -> Result<ProviderOutput, ExternalError> {
        let pair = AnalysisPair::new(model, stage);
        self.calls.lock().unwrap().push(pair);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().unwrap().get(&pair).cloned();
        match response {
            Some(Ok(raw)) => Ok(ProviderOutput {
                raw,
                response_time_ms: 850,
            }),
            Some(Err(message)) => Err(ExternalError::request("analysis provider", message)),
            None => Ok(ProviderOutput {
                raw: json!({"visibility_score": 70, "mention_rate": 40, "average_position": 2}),
                response_time_ms: 850,
            }),
        }
    }
}

/// Queues dispatched messages instead of delivering them.
#[derive(Default)]
pub struct QueueDispatcher {
    queue: Mutex<Vec<DispatchMessage>>,
    sent: Mutex<Vec<DispatchMessage>>,
    pub failing: AtomicBool,
}

impl QueueDispatcher {
    pub fn pop(&self) -> Option<DispatchMessage> {
        let mut queue = self.queue.lock().unwrap();
        (!queue.is_empty()).then(|| queue.remove(0))
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<DispatchMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<(), ExternalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExternalError::HttpStatus {
                service: "dispatcher",
                status: 503,
            });
        }
        self.queue.lock().unwrap().push(message.clone());
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), ExternalError> {
        self.sent.lock().unwrap().push(SentMail {
            to: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub struct StaticDirectory;

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_brand(&self, brand_id: DbId) -> Result<Option<Brand>, ExternalError> {
        Ok((brand_id == BRAND_ID || brand_id == BRAND_ID + 1).then(|| Brand {
            id: brand_id,
            name: if brand_id == BRAND_ID { "Acme" } else { "Globex" }.into(),
            domain: None,
        }))
    }

    async fn find_user(&self, user_id: DbId) -> Result<Option<User>, ExternalError> {
        Ok((user_id == USER_ID).then(|| User {
            id: USER_ID,
            email: USER_EMAIL.into(),
            display_name: Some("Owner".into()),
        }))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub locks: Arc<MemoryLocks>,
    pub provider: Arc<ScriptedProvider>,
    pub dispatcher: Arc<QueueDispatcher>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let locks = Arc::new(MemoryLocks::default());
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = Arc::new(QueueDispatcher::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let pipeline = Pipeline::new(
            Collaborators {
                store: store.clone(),
                locks: locks.clone(),
                provider: provider.clone(),
                dispatcher: dispatcher.clone(),
                notifier: notifier.clone(),
                directory: Arc::new(StaticDirectory),
            },
            config,
        );

        Self {
            pipeline,
            store,
            locks,
            provider,
            dispatcher,
            notifier,
        }
    }

    /// Start a run for the test brand.
    pub async fn start(&self, models: &[AiModel], stages: &[PipelineStage]) -> AnalysisRun {
        self.pipeline
            .driver
            .start(StartRun {
                brand_id: BRAND_ID,
                user_id: USER_ID,
                models: models.to_vec(),
                stages: stages.to_vec(),
            })
            .await
            .unwrap()
    }

    /// Deliver the next queued dispatch to the runner.
    pub async fn deliver_next(&self) -> Option<brandlens_pipeline::TaskOutcome> {
        let message = self.dispatcher.pop()?;
        Some(
            self.pipeline
                .runner
                .run(message.run_id, message.current_pair, message.remaining_pairs)
                .await
                .unwrap(),
        )
    }

    /// Deliver queued dispatches until the queue is empty.
    pub async fn drain(&self) {
        while self.deliver_next().await.is_some() {}
    }
}

pub fn pair(model: AiModel, stage: PipelineStage) -> AnalysisPair {
    AnalysisPair::new(model, stage)
}
