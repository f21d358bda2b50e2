use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Builds the HTTP router. Gzip sits outside the logging layer so logged
/// bodies are plain text.
pub fn build_http_app(state: AppState) -> Router {
    api::metric_routes()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::trusted_subnet_middleware,
        ))
        .with_state(state)
        .layer(middleware::from_fn(logging::request_logging))
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
}
