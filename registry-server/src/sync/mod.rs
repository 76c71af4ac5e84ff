//! Bulk registry synchronization
//!
//! - [`normalize`]: untyped rows → catalog values
//! - [`batch_writer`]: conflict-resolving batched inserts/updates
//! - [`snapshot`]: backup snapshots taken before destructive runs
//! - [`guard`]: photo guard for replace-all and delete
//! - [`replace_all`]: the guarded, snapshotted full replacement
//!
//! Batch uploads and replace-all both run under the registry advisory lock.

pub mod batch_writer;
pub mod guard;
pub mod normalize;
pub mod replace_all;
pub mod snapshot;

use crate::config::Config;
use crate::db::lock;
use crate::error::ServiceResult;
use batch_writer::BatchWriter;
use serde_json::Value;
use shared::error::{AppError, ErrorCode};
use shared::models::{BatchResults, UploadMode};
use sqlx::sqlite::Sqlite;
use sqlx::{Executor, SqlitePool};
use std::time::Instant;

/// Row failures echoed back to the caller
pub const MAX_ERROR_DETAILS: usize = 10;

/// Tunables for bulk runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub replace_batch_size: usize,
    pub lock_ttl_ms: i64,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            replace_batch_size: config.replace_batch_size,
            lock_ttl_ms: i64::try_from(config.migration_lock_ttl_secs.saturating_mul(1000))
                .unwrap_or(i64::MAX),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Held registry advisory lock.
///
/// There is no async drop: callers must [`release`](Self::release) on every
/// path once acquired. Multi-phase runs [`refresh`](Self::refresh) the lease
/// between phases so the TTL bounds a single phase, not the whole run.
#[derive(Debug)]
pub struct RegistryLock {
    holder: String,
    ttl_ms: i64,
}

impl RegistryLock {
    pub async fn acquire(pool: &SqlitePool, ttl_ms: i64) -> ServiceResult<Self> {
        let holder = uuid::Uuid::new_v4().to_string();
        let acquired = lock::try_acquire(
            pool,
            lock::REGISTRY_LOCK,
            &holder,
            shared::util::now_millis(),
            ttl_ms,
        )
        .await?;
        if !acquired {
            tracing::warn!("Registry lock is held by another run");
            return Err(AppError::new(ErrorCode::MigrationInProgress).into());
        }
        tracing::debug!(holder = %holder, "Registry lock acquired");
        Ok(Self { holder, ttl_ms })
    }

    /// Extend the lease; fails with `MigrationInProgress` if another run
    /// has taken it over.
    pub async fn refresh<'e, E>(&self, exec: E) -> ServiceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let held = lock::refresh(
            exec,
            lock::REGISTRY_LOCK,
            &self.holder,
            shared::util::now_millis(),
            self.ttl_ms,
        )
        .await?;
        if !held {
            tracing::error!(holder = %self.holder, "Registry lock was taken over mid-run");
            return Err(AppError::with_message(
                ErrorCode::MigrationInProgress,
                "Registry lock was taken over by another run",
            )
            .into());
        }
        tracing::debug!(holder = %self.holder, "Registry lock refreshed");
        Ok(())
    }

    pub async fn release(self, pool: &SqlitePool) {
        match lock::release(pool, lock::REGISTRY_LOCK, &self.holder).await {
            Ok(true) => tracing::debug!(holder = %self.holder, "Registry lock released"),
            Ok(false) => {
                tracing::warn!(holder = %self.holder, "Registry lock was taken over before release")
            }
            Err(e) => tracing::error!(holder = %self.holder, error = %e, "Failed to release registry lock"),
        }
    }
}

/// Incremental bulk upload (overwrite / merge / skip)
pub async fn batch_upload(
    pool: &SqlitePool,
    settings: &SyncSettings,
    rows: &[Value],
    mode: UploadMode,
    actor: &str,
) -> ServiceResult<BatchResults> {
    if mode == UploadMode::ReplaceAll {
        return Err(AppError::with_message(
            ErrorCode::InvalidUploadMode,
            "replaceAll is not an incremental mode",
        )
        .into());
    }

    let lock = RegistryLock::acquire(pool, settings.lock_ttl_ms).await?;
    let result = run_batch_upload(pool, settings, rows, mode, actor).await;
    lock.release(pool).await;
    result
}

async fn run_batch_upload(
    pool: &SqlitePool,
    settings: &SyncSettings,
    rows: &[Value],
    mode: UploadMode,
    actor: &str,
) -> ServiceResult<BatchResults> {
    let started = Instant::now();
    let (valid, mut row_errors) = normalize::normalize_batch(rows);

    let writer = BatchWriter::new(mode, settings.batch_size, actor);
    let mut conn = pool.acquire().await?;
    let outcome = writer.write(&mut conn, &valid).await;
    drop(conn);

    row_errors.extend(outcome.errors);
    let errors = row_errors.len();
    row_errors.truncate(MAX_ERROR_DETAILS);

    let results = BatchResults {
        total: rows.len(),
        created: outcome.created,
        updated: outcome.updated,
        skipped: outcome.skipped,
        errors,
        error_details: row_errors,
        elapsed_time: started.elapsed().as_millis() as u64,
    };

    tracing::info!(
        target: "audit",
        actor = %actor,
        mode = ?mode,
        total = results.total,
        created = results.created,
        updated = results.updated,
        skipped = results.skipped,
        errors = results.errors,
        failed_batches = outcome.failed_batches,
        batch_size = writer.batch_size(),
        elapsed_ms = results.elapsed_time,
        "Batch upload finished"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::error::ServiceError;
    use serde_json::json;

    #[tokio::test]
    async fn upload_reports_counts_and_row_errors() {
        let pool = test_pool().await;
        let settings = SyncSettings::default();
        let rows = vec![
            json!({ "business_name": "A" }),
            json!({ "business_name": "" }),
            json!({ "business_name": "B" }),
        ];
        let first = batch_upload(&pool, &settings, &rows, UploadMode::Overwrite, "u")
            .await
            .unwrap();
        assert_eq!((first.total, first.created, first.errors), (3, 2, 1));

        let second = batch_upload(&pool, &settings, &rows, UploadMode::Skip, "u")
            .await
            .unwrap();
        assert_eq!((second.created, second.skipped, second.errors), (0, 2, 1));
    }

    #[tokio::test]
    async fn error_details_are_capped() {
        let pool = test_pool().await;
        let rows: Vec<_> = (0..15).map(|_| json!({ "business_name": "" })).collect();
        let results = batch_upload(&pool, &SyncSettings::default(), &rows, UploadMode::Merge, "u")
            .await
            .unwrap();
        assert_eq!(results.errors, 15);
        assert_eq!(results.error_details.len(), MAX_ERROR_DETAILS);
    }

    #[tokio::test]
    async fn refresh_fails_once_the_lease_was_taken_over() {
        let pool = test_pool().await;
        let held = RegistryLock::acquire(&pool, 60_000).await.unwrap();
        held.refresh(&pool).await.unwrap();

        sqlx::query("UPDATE operation_locks SET holder = 'other'")
            .execute(&pool)
            .await
            .unwrap();
        let err = held.refresh(&pool).await.unwrap_err();
        assert!(matches!(err, ServiceError::App(ref e) if e.code == ErrorCode::MigrationInProgress));
    }

    #[tokio::test]
    async fn upload_fails_fast_while_lock_is_held() {
        let pool = test_pool().await;
        let settings = SyncSettings::default();
        let held = RegistryLock::acquire(&pool, settings.lock_ttl_ms).await.unwrap();

        let err = batch_upload(&pool, &settings, &[json!({ "business_name": "A" })], UploadMode::Overwrite, "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::App(ref e) if e.code == ErrorCode::MigrationInProgress));

        held.release(&pool).await;
        batch_upload(&pool, &settings, &[json!({ "business_name": "A" })], UploadMode::Overwrite, "u")
            .await
            .unwrap();
    }
}
