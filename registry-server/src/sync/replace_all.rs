//! Replace-all: swap the whole registry for an uploaded set
//!
//! Phases run strictly in order:
//!
//! ```text
//! lock → guard → snapshot → normalize → ┌ detach → delete → reinsert ┐ → reattach
//!                                       └──── one store transaction ──┘
//! ```
//!
//! The snapshot is the point of no return. Every failure after it carries
//! the snapshot id so an operator can restore from it.

use super::batch_writer::BatchWriter;
use super::normalize::normalize_batch;
use super::{RegistryLock, SyncSettings, guard, snapshot};
use crate::db::{air_permit, business, dependents, invoice};
use crate::error::{ServiceError, ServiceResult};
use serde_json::Value;
use shared::error::{AppError, ErrorCode};
use shared::models::{BusinessInput, ReplaceAllReport, UploadMode};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Detach,
    Delete,
    Reinsert,
    Reattach,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Detach => "detach",
            Phase::Delete => "delete",
            Phase::Reinsert => "reinsert",
            Phase::Reattach => "reattach",
        }
    }
}

/// A post-snapshot failure and the phase it happened in
#[derive(Debug)]
struct PhaseError {
    phase: Phase,
    source: ServiceError,
}

fn at<E: Into<ServiceError>>(phase: Phase) -> impl FnOnce(E) -> PhaseError {
    move |e| PhaseError {
        phase,
        source: e.into(),
    }
}

pub async fn replace_all(
    pool: &SqlitePool,
    settings: &SyncSettings,
    rows: &[Value],
    force_replace: bool,
    actor: &str,
) -> ServiceResult<ReplaceAllReport> {
    let lock = RegistryLock::acquire(pool, settings.lock_ttl_ms).await?;
    let result = run(pool, settings, &lock, rows, force_replace, actor).await;
    lock.release(pool).await;
    result
}

async fn run(
    pool: &SqlitePool,
    settings: &SyncSettings,
    lock: &RegistryLock,
    rows: &[Value],
    force_replace: bool,
    actor: &str,
) -> ServiceResult<ReplaceAllReport> {
    let started = Instant::now();

    if force_replace {
        tracing::warn!(target: "audit", actor = %actor, "Replace-all photo guard overridden");
    } else {
        guard::check_replace_all(pool).await?;
    }

    let mut conn = pool.acquire().await?;

    let (snapshot_id, snapshot_count) = snapshot::capture(&mut conn, actor)
        .await
        .map_err(|e| {
            tracing::error!(target: "audit", actor = %actor, error = ?e, "Replace-all aborted: snapshot failed");
            ServiceError::App(AppError::new(ErrorCode::SnapshotFailed))
        })?;
    tracing::info!(
        target: "audit",
        actor = %actor,
        snapshot_id,
        businesses = snapshot_count,
        "Replace-all snapshot committed"
    );

    let (valid, row_errors) = normalize_batch(rows);
    if valid.is_empty() {
        return Err(AppError::new(ErrorCode::NoValidRecords)
            .with_detail("snapshotId", snapshot_id)
            .with_detail("errors", row_errors.len())
            .into());
    }

    lock.refresh(&mut *conn)
        .await
        .map_err(at(Phase::Detach))
        .map_err(|e| phase_failure(snapshot_id, actor, e))?;
    let name_ids = replace_rows(&mut conn, settings, &valid, actor)
        .await
        .map_err(|e| phase_failure(snapshot_id, actor, e))?;

    lock.refresh(&mut *conn)
        .await
        .map_err(at(Phase::Reattach))
        .map_err(|e| phase_failure(snapshot_id, actor, e))?;
    let created = name_ids.len();

    let (restored, not_restored) = reattach(&mut conn, snapshot_id, &name_ids)
        .await
        .map_err(|e| phase_failure(snapshot_id, actor, e))?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        target: "audit",
        actor = %actor,
        snapshot_id,
        previous = snapshot_count,
        created,
        invalid_rows = row_errors.len(),
        air_permit_restored = restored,
        air_permit_not_restored = not_restored.len(),
        elapsed_ms,
        "Replace-all finished"
    );

    Ok(ReplaceAllReport {
        snapshot_id,
        created,
        air_permit_restored: restored,
        air_permit_not_restored: not_restored,
        elapsed_ms,
        message: format!(
            "Registry replaced with {created} businesses (backup snapshot {snapshot_id})"
        ),
    })
}

/// Detach, delete and reinsert inside one transaction.
///
/// Returns name → new id for the reinserted rows.
async fn replace_rows(
    conn: &mut SqliteConnection,
    settings: &SyncSettings,
    valid: &[BusinessInput],
    actor: &str,
) -> Result<HashMap<String, i64>, PhaseError> {
    let mut tx = conn.begin().await.map_err(at(Phase::Detach))?;

    let invoices = invoice::delete_for_active(&mut tx)
        .await
        .map_err(at(Phase::Detach))?;
    let dependents = dependents::delete_hard_referrers(&mut tx)
        .await
        .map_err(at(Phase::Detach))?;
    let unlinked = dependents::unlink_soft_referrers(&mut tx)
        .await
        .map_err(at(Phase::Detach))?;
    let permits = air_permit::delete_trees_for_active(&mut tx)
        .await
        .map_err(at(Phase::Detach))?;
    tracing::debug!(invoices, dependents, unlinked, permits, "Replace-all detach done");

    let deleted = business::delete_active(&mut tx)
        .await
        .map_err(at(Phase::Delete))?;
    tracing::debug!(deleted, "Replace-all delete done");

    let writer = BatchWriter::new(UploadMode::Skip, settings.replace_batch_size, actor);
    let outcome = writer.write(&mut tx, valid).await;
    if let Some(first) = outcome.errors.first() {
        return Err(PhaseError {
            phase: Phase::Reinsert,
            source: AppError::internal(format!(
                "{} of {} rows failed ({}: {})",
                outcome.errors.len(),
                valid.len(),
                first.business_name,
                first.error
            ))
            .into(),
        });
    }

    let name_ids = business::active_name_ids(&mut *tx)
        .await
        .map_err(at(Phase::Reinsert))?;
    tx.commit().await.map_err(at(Phase::Reinsert))?;
    Ok(name_ids)
}

/// Recreate permit trees from the stored snapshot.
///
/// Each business gets its own transaction; a failure only marks that
/// business as not restored.
async fn reattach(
    conn: &mut SqliteConnection,
    snapshot_id: i64,
    name_ids: &HashMap<String, i64>,
) -> Result<(usize, Vec<String>), PhaseError> {
    let entries = snapshot::load_entries(conn, snapshot_id)
        .await
        .map_err(at(Phase::Reattach))?;
    let now = shared::util::now_millis();

    let mut restored = 0;
    let mut not_restored = Vec::new();
    for entry in entries.iter().filter(|e| !e.air_permits.is_empty()) {
        let Some(&business_id) = name_ids.get(&entry.business_name) else {
            not_restored.push(entry.business_name.clone());
            continue;
        };

        match insert_trees(conn, business_id, entry, now).await {
            Ok(()) => restored += 1,
            Err(e) => {
                tracing::warn!(
                    business_name = %entry.business_name,
                    business_id,
                    error = %e,
                    "Air permit tree not restored"
                );
                not_restored.push(entry.business_name.clone());
            }
        }
    }

    Ok((restored, not_restored))
}

async fn insert_trees(
    conn: &mut SqliteConnection,
    business_id: i64,
    entry: &shared::models::SnapshotEntry,
    now: i64,
) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    for tree in &entry.air_permits {
        air_permit::insert_tree(&mut tx, business_id, tree, now).await?;
    }
    tx.commit().await
}

fn phase_failure(snapshot_id: i64, actor: &str, e: PhaseError) -> ServiceError {
    let cause = match &e.source {
        ServiceError::App(app) => app.message.clone(),
        ServiceError::Db(db) => db.to_string(),
    };
    tracing::error!(
        target: "audit",
        actor = %actor,
        snapshot_id,
        phase = e.phase.as_str(),
        error = %cause,
        "Replace-all failed after snapshot"
    );

    AppError::with_message(
        ErrorCode::ReplaceAllFailed,
        format!(
            "Replace-all failed during {}: {cause}. Restore from backup snapshot {snapshot_id}",
            e.phase.as_str()
        ),
    )
    .with_detail("snapshotId", snapshot_id)
    .with_detail("phase", e.phase.as_str())
    .into()
}
