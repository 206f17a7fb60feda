//! Tile image production.
//!
//! - [`color`]: source samples to RGBA under a transparency policy
//! - [`compositor`]: placement of partial windows on the fixed-size canvas
//! - [`png`]: PNG encoding

pub mod color;
pub mod compositor;
pub mod png;

pub use color::{to_rgba, AlphaPolicy};
pub use compositor::{composite, compute_placement, transparent_tile, OutputPlacement};
pub use png::{create_png, encode_png, EMPTY_PNG};
