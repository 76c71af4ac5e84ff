//! Bulk upload wire types

use serde::{Deserialize, Serialize};

/// Conflict policy of a bulk upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadMode {
    /// Replace every catalog field of the existing row
    #[default]
    Overwrite,
    /// Only write meaningfully present values
    Merge,
    /// Leave the existing row untouched
    Skip,
    /// Delete the registry and reinsert (guarded, snapshotted)
    ReplaceAll,
}

/// `POST /api/businesses` body when `isBatchUpload` is set
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadRequest {
    #[serde(default)]
    pub is_batch_upload: bool,
    #[serde(default)]
    pub upload_mode: UploadMode,
    /// Only honored for replace-all
    #[serde(default, rename = "force_replace")]
    pub force_replace: bool,
    #[serde(default)]
    pub businesses: Vec<serde_json::Value>,
}

/// Per-row failure surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub business_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResults {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    /// First ten row failures
    pub error_details: Vec<RowError>,
    /// Milliseconds
    pub elapsed_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUploadResponse {
    pub results: BatchResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAllReport {
    pub snapshot_id: i64,
    pub created: usize,
    /// Businesses whose permit tree was recreated
    pub air_permit_restored: usize,
    pub air_permit_not_restored: Vec<String>,
    pub elapsed_ms: u64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_request_wire_names() {
        let req: BulkUploadRequest = serde_json::from_value(serde_json::json!({
            "isBatchUpload": true,
            "uploadMode": "replaceAll",
            "force_replace": true,
            "businesses": [{ "business_name": "A" }]
        }))
        .unwrap();
        assert!(req.is_batch_upload);
        assert_eq!(req.upload_mode, UploadMode::ReplaceAll);
        assert!(req.force_replace);
        assert_eq!(req.businesses.len(), 1);
    }

    #[test]
    fn batch_results_camel_case() {
        let json = serde_json::to_value(BatchResults {
            total: 2,
            created: 1,
            skipped: 1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["errorDetails"], serde_json::json!([]));
        assert_eq!(json["elapsedTime"], 0);
    }
}
