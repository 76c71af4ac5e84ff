//! Business registry API: single-record CRUD and bulk uploads

mod handler;

use axum::{Router, routing::get};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/businesses", get(handler::list).post(handler::create))
        .route(
            "/api/businesses/{id}",
            get(handler::get_by_id)
                .put(handler::update)
                .delete(handler::delete),
        )
}
