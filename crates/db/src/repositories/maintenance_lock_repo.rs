//! Repository for the `maintenance_locks` table.
//!
//! Expiry is evaluated against the database clock (`NOW()`) so that
//! instances with skewed clocks still agree on who holds a lock.

use std::time::Duration;

use sqlx::PgPool;

use crate::models::maintenance_lock::MaintenanceLock;

pub struct MaintenanceLockRepo;

impl MaintenanceLockRepo {
    /// Take `name` for `holder_id` if it is free or its previous holder's
    /// lease has expired. Returns `true` when the lock was acquired.
    ///
    /// The upsert is a single statement: of two racing callers exactly one
    /// sees its row returned.
    pub async fn try_acquire(
        pool: &PgPool,
        name: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        let acquired: Option<(String,)> = sqlx::query_as(
            "INSERT INTO maintenance_locks (name, holder_id, acquired_at, expires_at) \
             VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3)) \
             ON CONFLICT (name) DO UPDATE \
                 SET holder_id = EXCLUDED.holder_id, \
                     acquired_at = EXCLUDED.acquired_at, \
                     expires_at = EXCLUDED.expires_at \
                 WHERE maintenance_locks.expires_at <= NOW() \
             RETURNING holder_id",
        )
        .bind(name)
        .bind(holder_id)
        .bind(ttl.as_secs_f64())
        .fetch_optional(pool)
        .await?;
        Ok(acquired.is_some_and(|(holder,)| holder == holder_id))
    }

    /// Delete the lock if `holder_id` still holds it.
    pub async fn release(pool: &PgPool, name: &str, holder_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM maintenance_locks WHERE name = $1 AND holder_id = $2")
            .bind(name)
            .bind(holder_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Push the expiry to `NOW() + ttl` if `holder_id` holds an unexpired lock.
    pub async fn extend(
        pool: &PgPool,
        name: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE maintenance_locks SET expires_at = NOW() + make_interval(secs => $3) \
             WHERE name = $1 AND holder_id = $2 AND expires_at > NOW()",
        )
        .bind(name)
        .bind(holder_id)
        .bind(ttl.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The current unexpired holder of `name`, if any.
    pub async fn find_active(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<MaintenanceLock>, sqlx::Error> {
        sqlx::query_as::<_, MaintenanceLock>(
            "SELECT name, holder_id, acquired_at, expires_at FROM maintenance_locks \
             WHERE name = $1 AND expires_at > NOW()",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
    }
}
