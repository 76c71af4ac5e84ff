//! Advisory operation lock (`operation_locks`)
//!
//! One row per key. Acquisition is a single upsert that only replaces an
//! existing row once it has expired, so a crashed holder cannot wedge the
//! registry for longer than the TTL.

use sqlx::Executor;
use sqlx::sqlite::Sqlite;

/// Key shared by batch uploads and replace-all
pub const REGISTRY_LOCK: &str = "registry_bulk";

/// Returns `true` when `holder` now owns the lock
pub async fn try_acquire<'e, E>(
    exec: E,
    key: &str,
    holder: &str,
    now: i64,
    ttl_ms: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO operation_locks (lock_key, holder, acquired_at, expires_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (lock_key) DO UPDATE SET holder = excluded.holder, acquired_at = excluded.acquired_at, expires_at = excluded.expires_at \
         WHERE operation_locks.expires_at < ?3",
    )
    .bind(key)
    .bind(holder)
    .bind(now)
    .bind(now + ttl_ms)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Push the expiry of a held lock to `now + ttl_ms`.
///
/// Returns `false` when `holder` no longer owns the row.
pub async fn refresh<'e, E>(
    exec: E,
    key: &str,
    holder: &str,
    now: i64,
    ttl_ms: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE operation_locks SET expires_at = ? WHERE lock_key = ? AND holder = ?",
    )
    .bind(now.saturating_add(ttl_ms))
    .bind(key)
    .bind(holder)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Release only if still held by `holder`
pub async fn release<'e, E>(exec: E, key: &str, holder: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM operation_locks WHERE lock_key = ? AND holder = ?")
        .bind(key)
        .bind(holder)
        .execute(exec)
        .await?;
    Ok(result.rows_affected() == 1)
}
