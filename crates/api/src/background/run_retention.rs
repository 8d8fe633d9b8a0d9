//! Periodic purge of finished analysis runs.
//!
//! Deletes terminal runs (and, by cascade, their pairs and results) whose
//! `completed_at` is older than the retention period. Running runs are
//! never touched.

use std::sync::Arc;
use std::time::Duration;

use brandlens_pipeline::JobStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// Run the retention loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn JobStore>, retention_days: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Run retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Run retention job stopping");
                break;
            }
            _ = interval.tick() => {
                purge(store.as_ref(), retention_days).await;
            }
        }
    }
}

/// Delete terminal runs finished more than `retention_days` ago.
pub async fn purge(store: &dyn JobStore, retention_days: i64) -> u64 {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    match store.delete_finished_before(cutoff).await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, "Run retention: purged old runs");
            } else {
                tracing::debug!("Run retention: nothing to purge");
            }
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "Run retention: cleanup failed");
            0
        }
    }
}
