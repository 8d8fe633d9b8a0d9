//! Narrow interfaces to the services the orchestration layer consumes.
//!
//! Each trait has exactly the surface the pipeline needs. Production
//! implementations live in `brandlens-pipeline` (directory), `brandlens-events`
//! (dispatcher, notifier) and `brandlens-provider` (analysis provider);
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::{AiModel, PipelineStage};
use crate::dispatch::DispatchMessage;
use crate::error::ExternalError;
use crate::normalize::ProviderOutput;
use crate::types::DbId;

/// The brand being analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: DbId,
    pub name: String,
    pub domain: Option<String>,
}

/// The user who asked for an analysis and receives the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub display_name: Option<String>,
}

/// Read-only lookups of brand and user records.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_brand(&self, brand_id: DbId) -> Result<Option<Brand>, ExternalError>;

    async fn find_user(&self, user_id: DbId) -> Result<Option<User>, ExternalError>;
}

/// Runs one brand analysis against an AI assistant.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(
        &self,
        brand: &Brand,
        model: AiModel,
        stage: PipelineStage,
    ) -> Result<ProviderOutput, ExternalError>;
}

/// Hands work to the external at-least-once delivery mechanism.
///
/// A successful return means the dispatcher accepted the message, not that
/// it has been processed.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<(), ExternalError>;
}

/// Sends a plain-text notification to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), ExternalError>;
}
