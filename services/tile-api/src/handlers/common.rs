//! Shared response helpers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tile_common::TileError;

/// JSON error body with the status the error maps to.
pub fn error_response(error: &TileError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": error.error_code(),
        "message": error.to_string(),
    });
    (status, Json(body)).into_response()
}
