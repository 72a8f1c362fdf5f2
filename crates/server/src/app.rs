//! Router construction.

use axum::{Router, extract::Request, middleware, routing::get};
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::middleware::{harden_response, request_id_middleware};
use crate::state::AppState;

/// Build the application router.
///
/// Serves the configured frontend root, falling back to `index.html` for
/// client-side routes. Every response passes through [`harden_response`].
pub fn build_router(state: AppState) -> Router {
    let root = state.config().root.clone();
    let assets = ServeDir::new(&root).fallback(ServeFile::new(root.join("index.html")));

    Router::new()
        .route("/health", get(health))
        .fallback_service(assets)
        .layer(middleware::from_fn_with_state(state.clone(), harden_response))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}
