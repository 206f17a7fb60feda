//! Vector archive byte ranges.

use axum::{
    extract::{Extension, Path},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument};

use storage::ProxyResponse;

use super::common::error_response;
use crate::state::AppState;

const ARCHIVE_SIZE: &str = "x-archive-size";

/// GET /archive/{layer}
///
/// With a usable `Range` header: 206 with the bytes. Without one: 200 with
/// size and validator headers and an empty body.
#[instrument(skip(state, headers))]
pub async fn archive_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(layer): Path<String>,
    headers: HeaderMap,
) -> Response {
    let archive = match state.catalog.archive(&layer) {
        Ok(archive) => archive,
        Err(e) => {
            state.metrics.record_archive_request(404);
            return error_response(&e);
        }
    };

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let response = match state.archives.serve(&archive.object_key, range).await {
        Ok(ProxyResponse::Metadata { size, e_tag }) => {
            let mut response = StatusCode::OK.into_response();
            let h = response.headers_mut();
            h.insert(HeaderName::from_static(ARCHIVE_SIZE), HeaderValue::from(size));
            h.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            insert_e_tag(h, e_tag.as_deref());
            response
        }
        Ok(ProxyResponse::Partial {
            body,
            range,
            size,
            e_tag,
        }) => {
            let content_range = range.content_range(size);
            let mut response = (StatusCode::PARTIAL_CONTENT, body).into_response();
            let h = response.headers_mut();
            h.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            h.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            h.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                h.insert(header::CONTENT_RANGE, value);
            }
            insert_e_tag(h, e_tag.as_deref());
            response
        }
        Err(e) => {
            error!(layer = %layer, error = %e, "Archive request failed");
            error_response(&e)
        }
    };

    state.metrics.record_archive_request(response.status().as_u16());
    response
}

fn insert_e_tag(headers: &mut HeaderMap, e_tag: Option<&str>) {
    if let Some(value) = e_tag.and_then(|t| HeaderValue::from_str(t).ok()) {
        headers.insert(header::ETAG, value);
    }
}
