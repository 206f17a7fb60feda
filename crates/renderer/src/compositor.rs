//! Output placement and tile compositing.

use image::{imageops, RgbaImage};
use once_cell::sync::OnceCell;

use crate::png::encode_png;
use cog_reader::{FractionalWindow, PixelWindow};
use tile_common::{TileError, TileResult, TILE_SIZE};

/// Region of the output canvas that receives source pixels.
///
/// Invariant: `width, height >= 1`, `x + width <= canvas`, `y + height <= canvas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPlacement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl OutputPlacement {
    /// Placement covering the whole canvas.
    pub fn full(canvas: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: canvas,
            height: canvas,
        }
    }

    pub fn is_full(&self, canvas: u32) -> bool {
        *self == Self::full(canvas)
    }

    /// Mirror the placement along the axes a level stores in reverse, so it
    /// is measured from the north-west corner of the canvas.
    pub fn oriented(self, flip_x: bool, flip_y: bool, canvas: u32) -> Self {
        let mirror = |offset: u32, length: u32| canvas.saturating_sub(offset + length);
        Self {
            x: if flip_x { mirror(self.x, self.width) } else { self.x },
            y: if flip_y { mirror(self.y, self.height) } else { self.y },
            ..self
        }
    }
}

/// One axis of the placement: offset and length on a canvas of `canvas`
/// pixels for the clamped span `[lo, hi)` of the fractional span `[f0, f1)`.
fn place_axis(f0: f64, f1: f64, lo: usize, hi: usize, canvas: u32) -> (u32, u32) {
    let span = f1 - f0;
    let size = f64::from(canvas);
    let to_canvas = |v: f64| -> f64 {
        if span > 0.0 {
            ((v - f0) / span * size).round()
        } else {
            0.0
        }
    };

    let start = to_canvas(lo as f64).clamp(0.0, size) as u32;
    let end = to_canvas(hi as f64).clamp(0.0, size) as u32;

    let offset = start.min(canvas - 1);
    let length = end.saturating_sub(start).max(1).min(canvas - offset);
    (offset, length)
}

/// Where the clamped `window` lands on a `canvas`-sized output, given the
/// unclamped `fractional` window the whole tile maps to.
pub fn compute_placement(
    fractional: &FractionalWindow,
    window: &PixelWindow,
    canvas: u32,
) -> OutputPlacement {
    let (x, width) = place_axis(fractional.x0, fractional.x1, window.left, window.right, canvas);
    let (y, height) = place_axis(fractional.y0, fractional.y1, window.top, window.bottom, canvas);
    OutputPlacement {
        x,
        y,
        width,
        height,
    }
}

/// Encode `rgba` (sized `placement.width` x `placement.height`) as a
/// `canvas`-sized PNG.
///
/// A region filling the whole canvas is encoded directly; anything else is
/// copied onto a transparent canvas first.
pub fn composite(rgba: Vec<u8>, placement: &OutputPlacement, canvas: u32) -> TileResult<Vec<u8>> {
    if placement.is_full(canvas) {
        return encode_png(&rgba, canvas as usize, canvas as usize);
    }

    if placement.x + placement.width > canvas || placement.y + placement.height > canvas {
        return Err(TileError::RenderError(format!(
            "placement {:?} exceeds {}px canvas",
            placement, canvas
        )));
    }

    let region = RgbaImage::from_raw(placement.width, placement.height, rgba).ok_or_else(|| {
        TileError::RenderError(format!(
            "pixel buffer does not match {}x{} region",
            placement.width, placement.height
        ))
    })?;

    let mut canvas_image = RgbaImage::new(canvas, canvas);
    imageops::replace(
        &mut canvas_image,
        &region,
        i64::from(placement.x),
        i64::from(placement.y),
    );

    encode_png(canvas_image.as_raw(), canvas as usize, canvas as usize)
}

static TRANSPARENT_TILE: OnceCell<Vec<u8>> = OnceCell::new();

/// Fully transparent PNG of the standard tile size.
pub fn transparent_tile() -> TileResult<&'static [u8]> {
    TRANSPARENT_TILE
        .get_or_try_init(|| {
            let size = TILE_SIZE as usize;
            encode_png(&vec![0; size * size * 4], size, size)
        })
        .map(Vec::as_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fractional(x0: f64, y0: f64, x1: f64, y1: f64) -> FractionalWindow {
        FractionalWindow { x0, y0, x1, y1 }
    }

    fn window(left: usize, top: usize, right: usize, bottom: usize) -> PixelWindow {
        PixelWindow {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn test_placement_full_tile() {
        let p = compute_placement(&fractional(0.0, 0.0, 256.0, 256.0), &window(0, 0, 256, 256), 256);
        assert!(p.is_full(256));
    }

    #[test]
    fn test_placement_right_half() {
        // Tile spans pixels -512..512, data starts at 0
        let p = compute_placement(
            &fractional(-512.0, 0.0, 512.0, 1024.0),
            &window(0, 0, 512, 1024),
            256,
        );
        assert_eq!(p, OutputPlacement { x: 128, y: 0, width: 128, height: 256 });
    }

    #[test]
    fn test_placement_never_zero_sized() {
        // A sliver one pixel wide in a tile spanning 100000 pixels
        let p = compute_placement(
            &fractional(0.0, 0.0, 100_000.0, 100_000.0),
            &window(0, 0, 1, 1),
            256,
        );
        assert_eq!((p.x, p.y, p.width, p.height), (0, 0, 1, 1));

        let p = compute_placement(
            &fractional(0.0, 0.0, 100_000.0, 100_000.0),
            &window(99_999, 99_999, 100_000, 100_000),
            256,
        );
        assert_eq!((p.x, p.y, p.width, p.height), (255, 255, 1, 1));
    }

    #[test]
    fn test_placement_oriented_mirrors_flipped_axes() {
        // Raster covers the southern quarter in storage order (rows from the south)
        let p = OutputPlacement { x: 0, y: 0, width: 256, height: 64 };
        assert_eq!(p.oriented(false, false, 256), p);
        assert_eq!(
            p.oriented(false, true, 256),
            OutputPlacement { x: 0, y: 192, width: 256, height: 64 }
        );

        let p = OutputPlacement { x: 10, y: 0, width: 100, height: 256 };
        assert_eq!(p.oriented(true, false, 256).x, 146);
        assert!(OutputPlacement::full(256).oriented(true, true, 256).is_full(256));
    }

    #[test]
    fn test_composite_places_region() {
        let placement = OutputPlacement {
            x: 10,
            y: 20,
            width: 2,
            height: 1,
        };
        let png = composite(vec![255, 0, 0, 255, 0, 255, 0, 255], &placement, 256).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (256, 256));
        assert_eq!(img.get_pixel(10, 20).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(11, 20).0, [0, 255, 0, 255]);
        assert_eq!(img.get_pixel(12, 20).0[3], 0);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_composite_rejects_mismatched_buffer() {
        let placement = OutputPlacement {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        };
        assert!(composite(vec![0; 8], &placement, 256).is_err());
    }

    #[test]
    fn test_transparent_tile() {
        let img = image::load_from_memory(transparent_tile().unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(img.dimensions(), (256, 256));
        assert!(img.pixels().all(|p| p.0[3] == 0));
    }
}
