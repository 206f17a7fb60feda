//! Geographic bounds to pixel windows, and windowed reads.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeSet, HashMap};

use crate::level::{Photometric, RasterLevel};
use crate::source::RasterSource;
use tile_common::{GeoBounds, TileError, TileResult};

/// Upper bound on block reads in flight for one window.
pub const MAX_CONCURRENT_BLOCK_READS: usize = 16;

/// Fractional pixel positions this close to an integer are treated as on it.
const SNAP_EPSILON: f64 = 1e-6;

/// Unclamped pixel-space rectangle, `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionalWindow {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl FractionalWindow {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// Integer pixel bounds clamped to a level, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl PixelWindow {
    /// True when the requested region does not intersect the level.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }
}

/// Pixel-space rectangle of `bounds` in `level`, before clamping.
///
/// Edges are sorted into storage order, so for levels stored south-up or
/// east-to-west `x0`/`y0` are the east/south edges. See
/// [`RasterLevel::flips_x`] and [`RasterLevel::flips_y`].
pub fn fractional_window(level: &RasterLevel, bounds: &GeoBounds) -> FractionalWindow {
    let (ax, ay) = level.geo_to_pixel(bounds.west, bounds.north);
    let (bx, by) = level.geo_to_pixel(bounds.east, bounds.south);
    FractionalWindow {
        x0: ax.min(bx),
        y0: ay.min(by),
        x1: ax.max(bx),
        y1: ay.max(by),
    }
}

/// Clamped pixel window covering `bounds` in `level`.
///
/// Lower edges round down and upper edges round up, so the window always
/// covers the fractional region it was computed from (to within
/// `SNAP_EPSILON` of a pixel).
pub fn compute_window(level: &RasterLevel, bounds: &GeoBounds) -> PixelWindow {
    let f = fractional_window(level, bounds);
    let clamp = |v: f64, max: usize| -> usize {
        if v.is_nan() || v <= 0.0 {
            0
        } else if v >= max as f64 {
            max
        } else {
            v as usize
        }
    };

    PixelWindow {
        left: clamp((f.x0 + SNAP_EPSILON).floor(), level.width),
        top: clamp((f.y0 + SNAP_EPSILON).floor(), level.height),
        right: clamp((f.x1 - SNAP_EPSILON).ceil(), level.width),
        bottom: clamp((f.y1 - SNAP_EPSILON).ceil(), level.height),
    }
}

/// Resampled pixels of a window, chunky 8-bit samples in source band order.
#[derive(Debug, Clone)]
pub struct PixelBlock {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub photometric: Photometric,
    pub alpha_band: Option<usize>,
    /// Sample value marking missing data in every band
    pub nodata: Option<u8>,
    pub data: Vec<u8>,
}

impl PixelBlock {
    /// Samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = (y * self.width + x) * self.bands;
        &self.data[start..start + self.bands]
    }
}

/// Source pixel for each output pixel along one axis (nearest neighbour).
fn sample_positions(start: usize, len: usize, out_len: usize) -> Vec<usize> {
    (0..out_len)
        .map(|o| {
            let rel = ((o as f64 + 0.5) * len as f64 / out_len as f64).floor() as usize;
            start + rel.min(len - 1)
        })
        .collect()
}

/// Read `window` of `level`, resampled to `out_width` x `out_height`.
///
/// Output rows run north to south and columns west to east whatever the
/// storage order of the level. Every block the window touches is fetched
/// with one bounded read, at most [`MAX_CONCURRENT_BLOCK_READS`] at a time.
/// The window must be non-empty.
pub async fn read_window(
    source: &RasterSource,
    level: &RasterLevel,
    window: &PixelWindow,
    out_width: usize,
    out_height: usize,
) -> TileResult<PixelBlock> {
    if window.is_empty() || out_width == 0 || out_height == 0 {
        return Err(TileError::InternalError(format!(
            "read_window called with empty window {:?} or output {}x{}",
            window, out_width, out_height
        )));
    }

    let mut xs = sample_positions(window.left, window.width(), out_width);
    let mut ys = sample_positions(window.top, window.height(), out_height);
    if level.flips_x() {
        xs.reverse();
    }
    if level.flips_y() {
        ys.reverse();
    }

    let layout = &level.layout;
    let block_cols: BTreeSet<usize> = xs.iter().map(|x| x / layout.block_width).collect();
    let block_rows: BTreeSet<usize> = ys.iter().map(|y| y / layout.block_height).collect();

    let wanted: Vec<(usize, usize)> = block_rows
        .iter()
        .flat_map(|&by| block_cols.iter().map(move |&bx| (bx, by)))
        .collect();
    let blocks: HashMap<(usize, usize), Vec<u8>> = stream::iter(wanted)
        .map(|(bx, by)| async move {
            source
                .read_block(level, bx, by)
                .await
                .map(|block| ((bx, by), block))
        })
        .buffer_unordered(MAX_CONCURRENT_BLOCK_READS)
        .try_collect()
        .await?;

    let (bands, photometric) = level.decoded_layout();
    let mut data = Vec::with_capacity(out_width * out_height * bands);
    for &sy in &ys {
        let by = sy / layout.block_height;
        let row_in_block = sy % layout.block_height;
        for &sx in &xs {
            let bx = sx / layout.block_width;
            let col_in_block = sx % layout.block_width;
            let block = blocks.get(&(bx, by)).ok_or_else(|| {
                TileError::InternalError(format!("block {},{} was not fetched", bx, by))
            })?;
            let start = (row_in_block * layout.block_width + col_in_block) * bands;
            data.extend_from_slice(&block[start..start + bands]);
        }
    }

    let nodata = match level.nodata {
        Some(v) if level.bits_per_sample == 8 && v.fract() == 0.0 && (0.0..=255.0).contains(&v) => {
            Some(v as u8)
        }
        _ => None,
    };

    Ok(PixelBlock {
        width: out_width,
        height: out_height,
        bands,
        photometric,
        alpha_band: level.decoded_alpha(),
        nodata,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_positions_identity() {
        assert_eq!(sample_positions(10, 4, 4), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_sample_positions_downsample() {
        assert_eq!(sample_positions(0, 8, 4), vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_sample_positions_upsample_stays_in_window() {
        let xs = sample_positions(5, 2, 5);
        assert_eq!(xs, vec![5, 5, 6, 6, 6]);
    }

    #[test]
    fn test_window_emptiness() {
        let w = PixelWindow {
            left: 3,
            top: 0,
            right: 3,
            bottom: 10,
        };
        assert!(w.is_empty());
        assert_eq!(w.width(), 0);
    }
}
