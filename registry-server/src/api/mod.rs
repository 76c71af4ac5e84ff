//! HTTP API for the registry server

pub mod air_permits;
pub mod backups;
pub mod businesses;
pub mod health;
pub mod invoices;
pub mod middleware;

use axum::Router;
use axum::middleware as axum_middleware;
use http::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use shared::error::{ApiResponse, AppError};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::require_auth;
use crate::state::AppState;

/// Handler result: success envelope or rendered `AppError`
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Deserialize a JSON value into a typed payload, as a validation failure
pub(crate) fn parse_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::validation(e.to_string()))
}

/// All routes; `/api/*` requires a bearer token, `/health` is public
pub fn build_router(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .merge(businesses::router())
        .merge(air_permits::router())
        .merge(backups::router())
        .merge(invoices::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new().merge(health::router()).merge(api)
}

/// Fully layered application, used by the server and by integration tests
///
/// The request id is assigned outermost so the logging middleware and the
/// response both carry it.
pub fn build_app(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    build_router(&state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), XRequestId))
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}
