//! Named, time-bounded mutual exclusion across instances.
//!
//! Every acquisition gets a fresh holder id; only that id can extend or
//! release the lease. Storage failures never grant a lock: they are logged
//! and reported as "not acquired" / `false`.

use std::sync::Arc;
use std::time::Duration;

use brandlens_core::types::Timestamp;
use serde::Serialize;
use uuid::Uuid;

use crate::store::LockStore;

/// Snapshot of a lock as seen by [`LockService::check`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LockStatus {
    pub held: bool,
    pub holder_id: Option<String>,
    pub expires_at: Option<Timestamp>,
}

#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn LockStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Try to take `name` for `ttl`. Returns the new holder id on success.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> Option<String> {
        let holder_id = Uuid::new_v4().to_string();
        match self.store.try_acquire(name, &holder_id, ttl).await {
            Ok(true) => {
                tracing::debug!(lock = name, holder_id = %holder_id, ttl_secs = ttl.as_secs(), "Lock acquired");
                Some(holder_id)
            }
            Ok(false) => {
                tracing::debug!(lock = name, "Lock held by another instance");
                None
            }
            Err(e) => {
                tracing::error!(lock = name, error = %e, "Lock acquisition failed");
                None
            }
        }
    }

    /// Release `name` if `holder_id` still holds it.
    pub async fn release(&self, name: &str, holder_id: &str) -> bool {
        match self.store.release(name, holder_id).await {
            Ok(released) => {
                if !released {
                    tracing::warn!(lock = name, holder_id, "Lock was no longer held at release");
                }
                released
            }
            Err(e) => {
                tracing::error!(lock = name, holder_id, error = %e, "Lock release failed");
                false
            }
        }
    }

    /// Push the lease to `now + ttl`; only the current, unexpired holder can.
    pub async fn extend(&self, name: &str, holder_id: &str, ttl: Duration) -> bool {
        match self.store.extend(name, holder_id, ttl).await {
            Ok(extended) => extended,
            Err(e) => {
                tracing::error!(lock = name, holder_id, error = %e, "Lock extension failed");
                false
            }
        }
    }

    pub async fn check(&self, name: &str) -> LockStatus {
        match self.store.find_active(name).await {
            Ok(Some(lock)) => LockStatus {
                held: true,
                holder_id: Some(lock.holder_id),
                expires_at: Some(lock.expires_at),
            },
            Ok(None) => LockStatus::default(),
            Err(e) => {
                tracing::error!(lock = name, error = %e, "Lock status check failed");
                LockStatus::default()
            }
        }
    }
}
