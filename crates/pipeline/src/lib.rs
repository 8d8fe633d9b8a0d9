//! Orchestration of brand-analysis runs.
//!
//! A run is a worklist of `(model, stage)` pairs processed one at a time by
//! independent invocations of the [`TaskRunner`], chained through an
//! external at-least-once dispatcher by the [`PipelineDriver`]. The
//! [`StuckRunSweeper`] recovers runs whose chain broke, serialized across
//! instances by the [`LockService`].

use std::sync::Arc;

use brandlens_core::collaborators::{AnalysisProvider, Directory, Dispatcher, Notifier};

pub mod config;
pub mod driver;
pub mod error;
pub mod lock;
pub mod resume;
pub mod runner;
pub mod store;
pub mod sweep;

pub use config::PipelineConfig;
pub use driver::{Advance, BrandAnalysisStatus, PipelineDriver, StartRun};
pub use error::{PipelineError, StoreError};
pub use lock::{LockService, LockStatus};
pub use resume::ResumeOutcome;
pub use runner::{TaskOutcome, TaskRunner};
pub use store::{JobStore, LockStore};
pub use sweep::{StuckRunSweeper, SWEEP_LOCK_NAME};

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn JobStore>,
    pub locks: Arc<dyn LockStore>,
    pub provider: Arc<dyn AnalysisProvider>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub notifier: Arc<dyn Notifier>,
    pub directory: Arc<dyn Directory>,
}

/// The wired pipeline components.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn JobStore>,
    pub driver: Arc<PipelineDriver>,
    pub runner: Arc<TaskRunner>,
    pub sweeper: Arc<StuckRunSweeper>,
    pub locks: LockService,
    pub config: PipelineConfig,
}

impl Pipeline {
    pub fn new(deps: Collaborators, config: PipelineConfig) -> Self {
        let driver = Arc::new(PipelineDriver::new(
            deps.store.clone(),
            deps.dispatcher,
            deps.notifier,
            deps.directory.clone(),
        ));
        let runner = Arc::new(TaskRunner::new(
            deps.store.clone(),
            deps.provider,
            deps.directory,
            driver.clone(),
            config.clone(),
        ));
        let locks = LockService::new(deps.locks);
        let sweeper = Arc::new(StuckRunSweeper::new(
            deps.store.clone(),
            locks.clone(),
            driver.clone(),
            config.clone(),
        ));

        Self {
            store: deps.store,
            driver,
            runner,
            sweeper,
            locks,
            config,
        }
    }
}
