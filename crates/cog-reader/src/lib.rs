//! Cloud-Optimized GeoTIFF access for tile synthesis.
//!
//! - [`range_reader`]: byte-range I/O over memory, object storage, or a
//!   time-limited HTTP URL
//! - [`tiff`]: TIFF/BigTIFF header and IFD parsing
//! - [`level`]: georeferenced resolution levels
//! - [`source`]: opened COG with its ordered levels and block decoding
//! - [`selector`]: resolution level choice for a target ground resolution
//! - [`window`]: geographic bounds to pixel windows and windowed reads

pub mod decode;
pub mod level;
pub mod range_reader;
pub mod selector;
pub mod source;
pub mod tiff;
pub mod window;

pub use level::{Compression, Photometric, RasterLevel, ResolutionSource};
pub use range_reader::{HttpRangeReader, MemoryRangeReader, ObjectStoreRangeReader, RangeReader};
pub use selector::{select_level, SelectionStrategy, LEVEL_TOLERANCE};
pub use source::RasterSource;
pub use window::{
    compute_window, fractional_window, read_window, FractionalWindow, PixelBlock, PixelWindow,
    MAX_CONCURRENT_BLOCK_READS,
};
