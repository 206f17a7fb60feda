//! Common types and utilities shared across the imagery tile services.

pub mod bounds;
pub mod error;
pub mod layer;
pub mod tile;

pub use bounds::GeoBounds;
pub use error::{TileError, TileResult};
pub use layer::{ArchiveLayer, LayerCatalog, LayerId, RasterLayer};
pub use tile::{tile_bounds, TileCoord, HALF_CIRCUMFERENCE, MAX_ZOOM, TILE_SIZE};
