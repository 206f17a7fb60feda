//! Web Mercator XYZ tile geometry.
//!
//! Tiles follow the slippy-map convention: `x` grows eastward from the
//! antimeridian and `y` grows southward from the top of the Mercator square.

use crate::{GeoBounds, TileError, TileResult};
use serde::{Deserialize, Serialize};

/// Half the earth's circumference in Web Mercator meters.
pub const HALF_CIRCUMFERENCE: f64 = 20037508.342789244;

/// Output tile edge length in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level accepted from callers.
pub const MAX_ZOOM: u32 = 24;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    /// Build a coordinate, rejecting indices outside the zoom level's grid.
    pub fn try_new(z: u32, x: u32, y: u32) -> TileResult<Self> {
        if z > MAX_ZOOM {
            return Err(TileError::invalid(
                "z",
                format!("zoom {} exceeds maximum {}", z, MAX_ZOOM),
            ));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n {
            return Err(TileError::invalid("x", format!("{} not in [0, {})", x, n)));
        }
        if u64::from(y) >= n {
            return Err(TileError::invalid("y", format!("{} not in [0, {})", y, n)));
        }
        Ok(Self { z, x, y })
    }

    /// Generate a cache key string.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }

    /// Web Mercator bounds of this tile.
    pub fn bounds(&self) -> GeoBounds {
        tile_bounds(self.z, self.x, self.y)
    }

    /// Ground resolution (meters per output pixel) needed to render this tile.
    pub fn ground_resolution(&self) -> f64 {
        tile_edge(self.z) / f64::from(TILE_SIZE)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Edge length of one tile at `zoom`, in meters.
pub fn tile_edge(zoom: u32) -> f64 {
    2.0 * HALF_CIRCUMFERENCE / (1u64 << zoom) as f64
}

/// Web Mercator bounds of tile `(zoom, x, y)`.
///
/// Callers must pass `0 <= x, y < 2^zoom`. Every edge is computed from its
/// own grid index so neighbouring tiles share bit-identical boundaries.
pub fn tile_bounds(zoom: u32, x: u32, y: u32) -> GeoBounds {
    let edge = tile_edge(zoom);
    let west = -HALF_CIRCUMFERENCE + f64::from(x) * edge;
    let east = -HALF_CIRCUMFERENCE + f64::from(x + 1) * edge;
    let north = HALF_CIRCUMFERENCE - f64::from(y) * edge;
    let south = HALF_CIRCUMFERENCE - f64::from(y + 1) * edge;
    GeoBounds::new(west, south, east, north)
}
