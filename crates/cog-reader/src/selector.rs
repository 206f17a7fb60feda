//! Resolution level selection.
//!
//! The chosen level is the coarsest one whose pixels are no larger than the
//! output pixels of the tile being rendered, so the pixel window read for a
//! tile always spans at least one output tile and is never upsampled.

use crate::level::{RasterLevel, ResolutionSource};

/// Targets finer than `LEVEL_TOLERANCE` times the full-resolution pixel size
/// are served from level 0 directly.
///
/// This only narrows the choice: an overview coarser than the target is never
/// accepted, whatever the tolerance.
pub const LEVEL_TOLERANCE: f64 = 1.5;

/// Relative slack absorbing floating point noise in resolution comparisons.
const RESOLUTION_EPSILON: f64 = 1e-9;

/// How the resolution of overview levels is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Use each level's own georeferencing. Levels without any (the usual
    /// case for GDAL overviews) fall back to the dimension ratio.
    #[default]
    DeclaredResolution,
    /// Scale the level 0 resolution by the width ratio of each level.
    DimensionRatio,
}

/// Index of the level to read for a target ground resolution in world units
/// per output pixel.
pub fn select_level(levels: &[RasterLevel], target: f64, strategy: SelectionStrategy) -> usize {
    let Some(base) = levels.first() else {
        return 0;
    };
    let base_res = base.resolution();
    if !target.is_finite() || target < base_res * LEVEL_TOLERANCE {
        return 0;
    }

    let limit = target * (1.0 + RESOLUTION_EPSILON);
    let mut best = 0;
    let mut best_res = base_res;

    for level in &levels[1..] {
        let ratio_res = base_res * base.width as f64 / level.width as f64;
        let res = match (strategy, level.resolution_source) {
            (SelectionStrategy::DeclaredResolution, ResolutionSource::Declared) => level.resolution(),
            _ => ratio_res,
        };

        if res <= limit && res > best_res {
            best = level.index;
            best_res = res;
        }
    }

    best
}
