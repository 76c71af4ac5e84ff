//! Request logging middleware

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use crate::auth::CallerIdentity;

/// `name(user_id)` of the authenticated caller, if any
fn caller_label(identity: &CallerIdentity) -> String {
    format!("{}({})", identity.actor(), identity.user_id)
}

/// Logs each request's start and outcome.
///
/// Start lines carry the request id, route and user agent. Completion lines
/// add the status, latency and the caller resolved by the auth layer, which
/// runs inside this one and hands the identity back on the response.
/// Rejected or failed requests are logged at WARN.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();

    let request_id = req
        .headers()
        .get(super::REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let user_agent = req
        .headers()
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    info!(request_id = %request_id, method = %method, path = %path, user_agent = %user_agent, "Request started");

    let response = next.run(req).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    let identity = response.extensions().get::<CallerIdentity>();
    let caller = identity.map(caller_label);
    let permission_level = identity.map(|i| i.permission_level);

    if response.status().is_client_error() || response.status().is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            caller = ?caller,
            permission_level = ?permission_level,
            "Request rejected"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            caller = ?caller,
            "Request completed"
        );
    }

    response
}
