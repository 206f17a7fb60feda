//! Per-stage observation of tile synthesis.

use std::time::Duration;
use tracing::debug;

use cog_reader::{PixelWindow, RasterLevel};
use renderer::OutputPlacement;
use tile_common::{GeoBounds, TileCoord};

/// How a tile request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEvent {
    Rendered,
    /// Tile lies outside the raster footprint
    Empty,
    Failed,
}

impl TileEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileEvent::Rendered => "rendered",
            TileEvent::Empty => "empty",
            TileEvent::Failed => "failed",
        }
    }
}

/// Receives the intermediate values of each synthesized tile.
///
/// Every method has a default that logs at `debug`.
pub trait TileDiagnostics: Send + Sync {
    fn bounds(&self, layer: &str, coord: TileCoord, bounds: &GeoBounds) {
        debug!(
            layer,
            tile = %coord,
            west = bounds.west,
            south = bounds.south,
            east = bounds.east,
            north = bounds.north,
            "Tile bounds"
        );
    }

    fn level_selected(&self, layer: &str, coord: TileCoord, level: &RasterLevel, target_resolution: f64) {
        debug!(
            layer,
            tile = %coord,
            level = level.index,
            resolution = level.resolution(),
            target_resolution,
            "Level selected"
        );
    }

    fn window(&self, layer: &str, coord: TileCoord, window: &PixelWindow) {
        debug!(
            layer,
            tile = %coord,
            left = window.left,
            top = window.top,
            right = window.right,
            bottom = window.bottom,
            "Pixel window"
        );
    }

    fn placement(&self, layer: &str, coord: TileCoord, placement: &OutputPlacement) {
        debug!(
            layer,
            tile = %coord,
            x = placement.x,
            y = placement.y,
            width = placement.width,
            height = placement.height,
            "Output placement"
        );
    }

    fn outcome(&self, layer: &str, coord: TileCoord, event: TileEvent, elapsed: Duration) {
        debug!(
            layer,
            tile = %coord,
            outcome = event.as_str(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Tile finished"
        );
    }
}

/// Diagnostics that only log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl TileDiagnostics for TracingDiagnostics {}
