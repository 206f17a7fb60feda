//! Ready-made rasters placed on the Web Mercator tile grid.
//!
//! The fixtures are georeferenced so that tile boundaries at a known zoom
//! fall exactly on pixel boundaries, which makes expected windows exact.

use crate::generators::position_rgb;
use crate::geotiff::GeoTiffBuilder;

/// Half the earth's circumference in Web Mercator meters.
pub const HALF_CIRCUMFERENCE: f64 = 20037508.342789244;

/// Edge length in meters of one tile at `zoom`.
pub fn tile_edge(zoom: u32) -> f64 {
    2.0 * HALF_CIRCUMFERENCE / (1u64 << zoom) as f64
}

/// Zoom at which one fixture pixel equals one output pixel.
pub const NATIVE_ZOOM: u32 = 12;

/// Tile column and row of the fixture's top-left corner at [`NATIVE_ZOOM`].
pub const ORIGIN_TILE: (u32, u32) = (2048, 1360);

/// Top-left world coordinates of tile `(x, y)` at `zoom`.
pub fn tile_origin(zoom: u32, x: u32, y: u32) -> (f64, f64) {
    let edge = tile_edge(zoom);
    (
        -HALF_CIRCUMFERENCE + f64::from(x) * edge,
        HALF_CIRCUMFERENCE - f64::from(y) * edge,
    )
}

/// Builder for a 512x512 RGB raster covering 2x2 tiles at [`NATIVE_ZOOM`],
/// starting at [`ORIGIN_TILE`], with the [`position_rgb`] pattern.
pub fn aligned_rgb_builder() -> GeoTiffBuilder {
    let (x, y) = tile_origin(NATIVE_ZOOM, ORIGIN_TILE.0, ORIGIN_TILE.1);
    let resolution = tile_edge(NATIVE_ZOOM) / 256.0;
    GeoTiffBuilder::new(512, 512, 3, position_rgb(512, 512))
        .georeference(x, y, resolution)
        .tile_size(128)
}

/// [`aligned_rgb_builder`] with 2x and 4x overviews.
pub fn aligned_rgb_cog() -> Vec<u8> {
    aligned_rgb_builder().overview(2).overview(4).build()
}
