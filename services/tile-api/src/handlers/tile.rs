//! Tile endpoints.
//!
//! `GET /tile?year=&z=&x=&y=` and `GET /tiles/{layer}/{z}/{x}/{y}.png` share
//! one path. Bad parameters answer 400 with a JSON body; anything that goes
//! wrong after that answers with a transparent PNG so a map shows no data
//! rather than an error.

use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument, warn};

use renderer::{transparent_tile, AlphaPolicy, EMPTY_PNG};
use tile_common::{RasterLayer, TileCoord, TileError, TileResult};

use super::common::error_response;
use crate::diagnostics::TileEvent;
use crate::metrics::Timer;
use crate::state::AppState;
use crate::synthesis::TileOutcome;

const CACHE_SUCCESS: &str = "public, max-age=86400";
const CACHE_FAILURE: &str = "no-store";

#[derive(Debug, Default, Deserialize)]
pub struct TileQuery {
    pub year: Option<String>,
    pub z: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> TileResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TileError::MissingParameter(name.to_string())),
    }
}

fn parse_index(value: &str, name: &str) -> TileResult<u32> {
    value
        .parse()
        .map_err(|_| TileError::invalid(name, format!("'{}' is not a non-negative integer", value)))
}

fn parse_coord(z: &str, x: &str, y: &str) -> TileResult<TileCoord> {
    TileCoord::try_new(parse_index(z, "z")?, parse_index(x, "x")?, parse_index(y, "y")?)
}

fn query_request(state: &AppState, query: &TileQuery) -> TileResult<(RasterLayer, TileCoord)> {
    let year = required(&query.year, "year")?;
    let coord = parse_coord(
        required(&query.z, "z")?,
        required(&query.x, "x")?,
        required(&query.y, "y")?,
    )?;
    // The layer is a query parameter here, so an unknown one is a bad request
    let layer = state
        .catalog
        .raster(year)
        .map_err(|_| TileError::invalid("year", format!("unknown layer '{}'", year)))?;
    Ok((layer.clone(), coord))
}

fn path_request(state: &AppState, layer: &str, z: &str, x: &str, y: &str) -> TileResult<(RasterLayer, TileCoord)> {
    let y = y
        .strip_suffix(".png")
        .ok_or_else(|| TileError::invalid("y", "tiles are only served as .png"))?;
    let coord = parse_coord(z, x, y)?;
    Ok((state.catalog.raster(layer)?.clone(), coord))
}

/// GET /tile?year={layer}&z={z}&x={x}&y={y}
pub async fn tile_query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TileQuery>,
) -> Response {
    match query_request(&state, &query) {
        Ok((layer, coord)) => serve_tile(&state, &layer, coord).await,
        Err(e) => error_response(&e),
    }
}

/// GET /tiles/{layer}/{z}/{x}/{y}.png
pub async fn tile_path_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((layer, z, x, y)): Path<(String, String, String, String)>,
) -> Response {
    match path_request(&state, &layer, &z, &x, &y) {
        Ok((layer, coord)) => serve_tile(&state, &layer, coord).await,
        Err(e) => error_response(&e),
    }
}

#[instrument(skip(state, layer), fields(layer = %layer.id, tile = %coord))]
async fn serve_tile(state: &AppState, layer: &RasterLayer, coord: TileCoord) -> Response {
    let layer_id = layer.id.as_str();
    state.metrics.record_tile_request(layer_id);

    let cache_key = format!("{}/{}", layer_id, coord.cache_key());
    if let Some(png) = state.tile_cache.get(&cache_key).await {
        state.metrics.record_cache_hit();
        return png_response(png, CACHE_SUCCESS, "HIT");
    }
    state.metrics.record_cache_miss();

    let timer = Timer::start();
    let result = render(state, layer, coord).await;
    let elapsed = timer.elapsed();

    let (event, response) = match result {
        Ok((event, png)) => {
            state.tile_cache.insert(&cache_key, png.clone()).await;
            (event, png_response(png, CACHE_SUCCESS, "MISS"))
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Tile synthesis failed");
            (
                TileEvent::Failed,
                png_response(Bytes::from_static(EMPTY_PNG), CACHE_FAILURE, "MISS"),
            )
        }
    };

    state.metrics.record_tile(event, elapsed);
    state
        .synthesizer
        .diagnostics()
        .outcome(layer_id, coord, event, elapsed);
    if elapsed.as_millis() > u128::from(state.config.slow_tile_ms) {
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            outcome = event.as_str(),
            "Slow tile"
        );
    }
    response
}

async fn render(state: &AppState, layer: &RasterLayer, coord: TileCoord) -> TileResult<(TileEvent, Bytes)> {
    let source = state.rasters.get(&layer.object_key).await?;
    let policy = AlphaPolicy {
        black_is_nodata: layer.black_is_nodata,
    };

    match state
        .synthesizer
        .synthesize(layer.id.as_str(), &source, coord, policy)
        .await?
    {
        TileOutcome::Rendered(png) => Ok((TileEvent::Rendered, png)),
        TileOutcome::Empty => Ok((TileEvent::Empty, Bytes::from_static(transparent_tile()?))),
    }
}

fn png_response(png: Bytes, cache_control: &'static str, cache_status: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CACHE_CONTROL, HeaderValue::from_static(cache_control)),
            (
                header::HeaderName::from_static("x-cache"),
                HeaderValue::from_static(cache_status),
            ),
        ],
        png,
    )
        .into_response()
}
