//! Dispatcher webhooks, mounted at the root so their paths match what the
//! dispatcher is configured to call.

use axum::routing::post;
use axum::Router;
use brandlens_core::dispatch::{DISPATCH_PATH, RESUME_PATH};

use crate::handlers::webhooks;
use crate::state::AppState;

/// ```text
/// POST   /webhooks/analysis/dispatch -> dispatch
/// POST   /webhooks/analysis/resume   -> resume
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(DISPATCH_PATH, post(webhooks::dispatch))
        .route(RESUME_PATH, post(webhooks::resume))
}
