//! Backup API Handlers

use axum::extract::{Path, State};
use shared::error::ApiResponse;
use shared::models::{BackupSnapshotDetail, BackupSnapshotMeta};

use crate::api::ApiResult;
use crate::state::AppState;
use crate::sync::snapshot;

/// GET /api/backups
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<BackupSnapshotMeta>> {
    Ok(ApiResponse::success(snapshot::list(&state.pool).await?))
}

/// GET /api/backups/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<BackupSnapshotDetail> {
    Ok(ApiResponse::success(snapshot::detail(&state.pool, id).await?))
}
