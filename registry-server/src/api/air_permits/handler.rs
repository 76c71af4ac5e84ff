//! Air Permit API Handlers

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use shared::error::ApiResponse;
use shared::models::AirPermitTree;

use crate::api::{ApiResult, parse_body};
use crate::auth::CallerIdentity;
use crate::registry;
use crate::state::AppState;

/// GET /api/businesses/{id}/air-permits
pub async fn list(
    State(state): State<AppState>,
    Path(business_id): Path<i64>,
) -> ApiResult<Vec<AirPermitTree>> {
    let trees = registry::air_permits(&state.pool, business_id).await?;
    Ok(ApiResponse::success(trees))
}

/// POST /api/businesses/{id}/air-permits
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(business_id): Path<i64>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<AirPermitTree> {
    let tree: AirPermitTree = parse_body(body)?;
    let created =
        registry::create_air_permit(&state.pool, business_id, &tree, caller.actor()).await?;
    Ok(ApiResponse::success(created))
}
