//! Business API Handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use shared::error::{ApiResponse, AppError};
use shared::models::{
    BatchUploadResponse, BulkUploadRequest, BusinessListItem, BusinessQuery, BusinessRecord,
    DeleteBusinessQuery, UploadMode,
};

use crate::api::{ApiResult, parse_body};
use crate::auth::CallerIdentity;
use crate::registry;
use crate::state::AppState;
use crate::sync;

/// GET /api/businesses
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<BusinessQuery>,
) -> ApiResult<Vec<BusinessListItem>> {
    let items = registry::list(&state.pool, &query).await?;
    Ok(ApiResponse::success(items))
}

/// GET /api/businesses/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<BusinessRecord> {
    Ok(ApiResponse::success(registry::get(&state.pool, id).await?))
}

/// POST /api/businesses
///
/// A body with `isBatchUpload: true` is a bulk upload dispatched on
/// `uploadMode`; anything else creates a single business.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let is_batch = body
        .get("isBatchUpload")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_batch {
        let record = registry::create(&state.pool, &body, caller.actor()).await?;
        return Ok(ApiResponse::success(record).into_response());
    }

    let request: BulkUploadRequest = parse_body(body)?;
    tracing::info!(
        rows = request.businesses.len(),
        mode = ?request.upload_mode,
        force_replace = request.force_replace,
        actor = %caller.actor(),
        "Bulk upload requested"
    );

    let response = match request.upload_mode {
        UploadMode::ReplaceAll => {
            let report = sync::replace_all::replace_all(
                &state.pool,
                &state.sync,
                &request.businesses,
                request.force_replace,
                caller.actor(),
            )
            .await?;
            ApiResponse::success(report).into_response()
        }
        mode => {
            let results = sync::batch_upload(
                &state.pool,
                &state.sync,
                &request.businesses,
                mode,
                caller.actor(),
            )
            .await?;
            ApiResponse::success(BatchUploadResponse { results }).into_response()
        }
    };
    Ok(response)
}

/// PUT /api/businesses/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<BusinessRecord> {
    let fields = body
        .as_object()
        .ok_or_else(|| AppError::invalid_request("Request body must be a JSON object"))?;
    let record = registry::update(&state.pool, id, fields, caller.actor()).await?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/businesses/{id}?force=
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteBusinessQuery>,
) -> ApiResult<()> {
    registry::delete(&state.pool, id, query.force, caller.actor()).await?;
    Ok(ApiResponse::ok())
}
