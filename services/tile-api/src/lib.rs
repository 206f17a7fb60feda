//! Imagery tile service.
//!
//! Serves PNG tiles synthesized from Cloud-Optimized GeoTIFFs and byte
//! ranges of vector tile archives, both read from a private bucket.

pub mod config;
pub mod diagnostics;
pub mod handlers;
pub mod metrics;
pub mod raster_pool;
pub mod state;
pub mod synthesis;

use axum::{
    extract::Extension,
    http::{header, HeaderName, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Router with every endpoint, request tracing and CORS for the map viewer.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ETAG,
            HeaderName::from_static("x-archive-size"),
            HeaderName::from_static("x-cache"),
        ]);

    Router::new()
        .route("/tile", get(handlers::tile_query_handler))
        .route("/tiles/:layer/:z/:x/:y", get(handlers::tile_path_handler))
        .route("/archive/:layer", get(handlers::archive_handler))
        .route("/health", get(handlers::health_handler))
        .route("/sources", get(handlers::sources_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
