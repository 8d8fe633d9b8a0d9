use std::sync::Arc;

use brandlens_pipeline::Pipeline;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health check, background jobs).
    pub pool: brandlens_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Runner, driver and sweeper wired to their stores and collaborators.
    pub pipeline: Pipeline,
}
