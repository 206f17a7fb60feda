//! Health checks, source listing and metrics.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

/// GET /health
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sources": state.catalog.raster_ids(),
        "cache_size": state.tile_cache.len(),
    }))
}

/// GET /sources
pub async fn sources_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "sources": state.catalog.raster_ids(),
        "tileUrl": "/tile?year={year}&z={z}&x={x}&y={y}",
    }))
}

/// GET /metrics - Prometheus text format
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    state.metrics.record_tile_cache_stats(state.tile_cache.stats());

    let body = match &state.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
