//! Air permit tree API

mod handler;

use axum::{Router, routing::get};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/businesses/{id}/air-permits",
        get(handler::list).post(handler::create),
    )
}
