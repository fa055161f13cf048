//! Router configuration.

use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// CORS policy for the ticket web form.
///
/// Any origin may POST JSON. Preflight requests are answered by the layer.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Build the complete Axum router.
///
/// Configures:
/// - `POST /ticket`
/// - `GET /health`, `GET /health/ready`, `GET /health/live`
/// - `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ticket", post(handlers::create_ticket))
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::readiness))
        .route("/health/live", get(handlers::liveness))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
}
