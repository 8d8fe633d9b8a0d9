use brandlens_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `maintenance_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MaintenanceLock {
    pub name: String,
    pub holder_id: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}
