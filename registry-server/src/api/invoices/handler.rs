//! Invoice API Handlers

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::Value;
use shared::error::{ApiResponse, AppError, ErrorCode};
use shared::models::{
    BusinessReceivables, InvoiceCreate, InvoiceRecord, InvoiceStage, InvoiceUpdate,
    ReceivableSummary,
};

use crate::api::{ApiResult, parse_body};
use crate::auth::CallerIdentity;
use crate::ledger;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DeleteInvoiceResponse {
    pub deleted: u64,
}

/// An unknown `stage` gets its own code rather than a generic parse failure
fn check_stage(body: &Value) -> Result<(), AppError> {
    if let Some(stage) = body.get("stage")
        && serde_json::from_value::<InvoiceStage>(stage.clone()).is_err()
    {
        return Err(
            AppError::new(ErrorCode::InvalidInvoiceStage).with_detail("stage", stage.clone())
        );
    }
    Ok(())
}

/// GET /api/businesses/{id}/invoices
pub async fn list(
    State(state): State<AppState>,
    Path(business_id): Path<i64>,
) -> ApiResult<Vec<InvoiceRecord>> {
    Ok(ApiResponse::success(ledger::list(&state.pool, business_id).await?))
}

/// POST /api/businesses/{id}/invoices
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(business_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<InvoiceRecord> {
    check_stage(&body)?;
    let payload: InvoiceCreate = parse_body(body)?;
    let record = ledger::create(&state.pool, business_id, payload, caller.actor()).await?;
    Ok(ApiResponse::success(record))
}

/// PUT /api/invoices/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<InvoiceRecord> {
    let payload: InvoiceUpdate = parse_body(body)?;
    let record = ledger::update(&state.pool, id, payload, caller.actor()).await?;
    Ok(ApiResponse::success(record))
}

/// POST /api/invoices/{id}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<i64>,
) -> ApiResult<InvoiceRecord> {
    let record = ledger::cancel(&state.pool, id, caller.actor()).await?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/invoices/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<i64>,
) -> ApiResult<DeleteInvoiceResponse> {
    let deleted =
        ledger::delete(&state.pool, id, caller.actor(), caller.permission_level).await?;
    Ok(ApiResponse::success(DeleteInvoiceResponse { deleted }))
}

/// GET /api/businesses/{id}/receivables
pub async fn business_receivables(
    State(state): State<AppState>,
    Path(business_id): Path<i64>,
) -> ApiResult<BusinessReceivables> {
    let receivables = ledger::business_receivables(&state.pool, business_id).await?;
    Ok(ApiResponse::success(receivables))
}

/// GET /api/receivables
pub async fn summary(State(state): State<AppState>) -> ApiResult<ReceivableSummary> {
    Ok(ApiResponse::success(ledger::summary(&state.pool).await?))
}
