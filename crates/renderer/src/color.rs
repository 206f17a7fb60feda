//! Source samples to RGBA.
//!
//! Exactly one conversion is applied per declared photometric model; band
//! order is taken as the file declares it.

use cog_reader::{Photometric, PixelBlock};
use tile_common::{TileError, TileResult};

/// Rules deciding which pixels become transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaPolicy {
    /// Pixels whose converted color is pure black are treated as nodata
    pub black_is_nodata: bool,
}

impl Default for AlphaPolicy {
    fn default() -> Self {
        Self {
            black_is_nodata: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorModel {
    Rgb,
    YCbCr,
    Gray,
}

fn color_model(block: &PixelBlock) -> TileResult<ColorModel> {
    let color_bands = block.bands - usize::from(block.alpha_band.is_some());
    let model = match block.photometric {
        Photometric::Rgb => ColorModel::Rgb,
        Photometric::YCbCr => ColorModel::YCbCr,
        Photometric::Gray => ColorModel::Gray,
        Photometric::Other if color_bands >= 3 => ColorModel::Rgb,
        Photometric::Other => ColorModel::Gray,
    };
    let needed = if model == ColorModel::Gray { 1 } else { 3 };
    if color_bands < needed {
        return Err(TileError::UnsupportedRaster(format!(
            "{:?} needs {} color bands, block has {}",
            block.photometric, needed, color_bands
        )));
    }
    Ok(model)
}

/// Full-range BT.601 YCbCr to RGB.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}

/// Convert a block to tightly packed RGBA.
pub fn to_rgba(block: &PixelBlock, policy: AlphaPolicy) -> TileResult<Vec<u8>> {
    let model = color_model(block)?;
    let mut out = Vec::with_capacity(block.width * block.height * 4);

    for samples in block.data.chunks_exact(block.bands) {
        let rgb = match model {
            ColorModel::Rgb => [samples[0], samples[1], samples[2]],
            ColorModel::YCbCr => ycbcr_to_rgb(samples[0], samples[1], samples[2]),
            ColorModel::Gray => [samples[0]; 3],
        };

        let mut alpha = block.alpha_band.map_or(255, |i| samples[i]);

        if let Some(nodata) = block.nodata {
            let all_nodata = samples
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != block.alpha_band)
                .all(|(_, &v)| v == nodata);
            if all_nodata {
                alpha = 0;
            }
        }
        if policy.black_is_nodata && rgb == [0, 0, 0] {
            alpha = 0;
        }

        out.extend_from_slice(&rgb);
        out.push(alpha);
    }

    Ok(out)
}
