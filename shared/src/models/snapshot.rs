//! Backup snapshot models

use super::air_permit::AirPermitTree;
use super::business::BusinessRecord;
use super::invoice::InvoiceRecord;
use serde::{Deserialize, Serialize};

/// `snapshot_type` written before a replace-all
pub const SNAPSHOT_TYPE_REPLACE_ALL: &str = "replace_all";

/// One business with its dependent data, as written into a snapshot payload
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotBusiness {
    #[serde(flatten)]
    pub record: BusinessRecord,
    pub air_permits: Vec<AirPermitTree>,
    pub invoice_records: Vec<InvoiceRecord>,
}

/// Read model used to rebuild permit trees from a stored payload.
///
/// Everything except the name and tree is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotEntry {
    pub business_name: String,
    #[serde(default)]
    pub air_permits: Vec<AirPermitTree>,
}

/// Snapshot metadata (list view)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BackupSnapshotMeta {
    pub id: i64,
    pub snapshot_type: String,
    pub record_count: i64,
    pub created_at: i64,
    pub created_by: Option<String>,
}

/// Snapshot with its payload (detail view)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshotDetail {
    #[serde(flatten)]
    pub meta: BackupSnapshotMeta,
    pub payload: serde_json::Value,
}
