//! Invoice-stage ledger API

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/businesses/{id}/invoices",
            get(handler::list).post(handler::create),
        )
        .route(
            "/api/businesses/{id}/receivables",
            get(handler::business_receivables),
        )
        .route("/api/receivables", get(handler::summary))
        .route(
            "/api/invoices/{id}",
            put(handler::update).delete(handler::delete),
        )
        .route("/api/invoices/{id}/cancel", post(handler::cancel))
}
