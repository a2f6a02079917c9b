//! Router assembly.
//!
//! All endpoints are JSON over HTTP under `/api`, plus an unauthenticated
//! `/healthz` probe.

pub mod diagrams;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/diagrams", get(diagrams::list_diagrams).post(diagrams::create_diagram))
        .route(
            "/api/diagrams/{id}",
            get(diagrams::get_diagram)
                .put(diagrams::update_diagram)
                .delete(diagrams::delete_diagram),
        )
        .route("/api/diagrams/{id}/versions", get(diagrams::list_versions))
        .route("/api/diagrams/{id}/versions/{version}", get(diagrams::get_version))
        .route("/api/diagrams/{id}/optimize", post(diagrams::optimize_diagram))
        .route("/api/optimize", post(diagrams::optimize_markup))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
