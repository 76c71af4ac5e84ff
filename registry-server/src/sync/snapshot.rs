//! Backup snapshots of the registry

use crate::db::{air_permit, business, invoice, snapshot};
use crate::error::ServiceResult;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    BackupSnapshotDetail, BackupSnapshotMeta, SNAPSHOT_TYPE_REPLACE_ALL, SnapshotBusiness,
    SnapshotEntry,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;

/// Serialize every non-deleted business with its permit tree and invoice
/// records, persist the document and return `(snapshot id, business count)`.
pub async fn capture(conn: &mut SqliteConnection, actor: &str) -> ServiceResult<(i64, usize)> {
    let records = business::all_active(&mut *conn).await?;
    let mut trees = air_permit::load_trees(conn, None).await?;

    let mut invoices: HashMap<i64, Vec<_>> = HashMap::new();
    for record in invoice::list_for_active(&mut *conn).await? {
        invoices.entry(record.business_id).or_default().push(record);
    }

    let entries: Vec<SnapshotBusiness> = records
        .into_iter()
        .map(|record| SnapshotBusiness {
            air_permits: trees.remove(&record.id).unwrap_or_default(),
            invoice_records: invoices.remove(&record.id).unwrap_or_default(),
            record,
        })
        .collect();

    let payload = serde_json::to_string(&entries)?;
    let count = entries.len();
    let id = snapshot::insert(
        &mut *conn,
        SNAPSHOT_TYPE_REPLACE_ALL,
        &payload,
        count as i64,
        actor,
        shared::util::now_millis(),
    )
    .await?;

    tracing::info!(snapshot_id = id, businesses = count, bytes = payload.len(), "Backup snapshot written");
    Ok((id, count))
}

/// Re-read a snapshot from the store for tree reattachment
pub async fn load_entries(conn: &mut SqliteConnection, id: i64) -> ServiceResult<Vec<SnapshotEntry>> {
    let payload = snapshot::find_payload(&mut *conn, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::SnapshotNotFound).with_detail("snapshotId", id))?;
    Ok(serde_json::from_str(&payload)?)
}

pub async fn list(pool: &SqlitePool) -> ServiceResult<Vec<BackupSnapshotMeta>> {
    Ok(snapshot::list(pool).await?)
}

pub async fn detail(pool: &SqlitePool, id: i64) -> ServiceResult<BackupSnapshotDetail> {
    let meta = snapshot::find_meta(pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::SnapshotNotFound))?;
    let payload = snapshot::find_payload(pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::SnapshotNotFound))?;
    Ok(BackupSnapshotDetail {
        meta,
        payload: serde_json::from_str(&payload)?,
    })
}
