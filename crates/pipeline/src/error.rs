use brandlens_core::error::{CoreError, ExternalError};

/// Failure of a storage backend behind [`JobStore`](crate::store::JobStore)
/// or [`LockStore`](crate::store::LockStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value no longer parses (unknown model name, status id).
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    External(#[from] ExternalError),
}

impl PipelineError {
    /// Whether redelivering the same input could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Core(_))
    }
}
