pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/applications/:application_id",
            get(handlers::handle_get_application),
        )
        .route(
            "/api/v1/applications/:application_id/process",
            post(handlers::handle_process),
        )
        .route(
            "/api/v1/applications/:application_id/preview",
            get(handlers::handle_preview),
        )
        .with_state(state)
}
