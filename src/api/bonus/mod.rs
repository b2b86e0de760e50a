mod handlers;

use axum::{routing::get, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/academic/list", get(handlers::academic_list))
        .route("/comprehensive/list", get(handlers::comprehensive_list))
        .route("/summary", get(handlers::summary))
}
