//! Backup snapshot API (read-only)

mod handler;

use axum::{Router, routing::get};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/backups", get(handler::list))
        .route("/api/backups/{id}", get(handler::get_by_id))
}
