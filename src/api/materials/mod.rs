mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_materials))
        .route("/review", post(handlers::review_material))
        .route("/pending", get(handlers::list_pending))
        .route("/statistics", get(handlers::statistics))
        .route("/:material_id", get(handlers::get_material).delete(handlers::delete_material))
}
