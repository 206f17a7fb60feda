//! Georeferenced resolution levels of a COG.

use bytes::Bytes;

use crate::tiff::{self, Ifd, TiffBytes};
use tile_common::{GeoBounds, TileError, TileResult};

/// Color model declared by the TIFF `PhotometricInterpretation` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    Rgb,
    YCbCr,
    Gray,
    Other,
}

impl Photometric {
    pub fn from_tag(value: u16) -> Self {
        match value {
            0 | 1 => Photometric::Gray,
            2 => Photometric::Rgb,
            6 => Photometric::YCbCr,
            _ => Photometric::Other,
        }
    }
}

/// Block compression schemes the reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Jpeg,
    Deflate,
    Zstd,
}

impl Compression {
    pub fn from_tag(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            7 => Some(Compression::Jpeg),
            8 | 32946 => Some(Compression::Deflate),
            50000 => Some(Compression::Zstd),
            _ => None,
        }
    }
}

/// Where a level's georeferencing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The IFD carries its own pixel scale and tiepoint (or transformation)
    Declared,
    /// Derived from level 0 by the ratio of pixel dimensions
    Derived,
}

/// Tile or strip grid of one level.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    pub block_width: usize,
    pub block_height: usize,
    pub blocks_across: usize,
    pub blocks_down: usize,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
}

impl BlockLayout {
    pub fn block_count(&self) -> usize {
        self.blocks_across * self.blocks_down
    }

    pub fn block_index(&self, bx: usize, by: usize) -> usize {
        by * self.blocks_across + bx
    }
}

/// One resolution level of a raster source.
#[derive(Debug, Clone)]
pub struct RasterLevel {
    /// Position in the source, 0 = full resolution
    pub index: usize,
    pub origin_x: f64,
    pub origin_y: f64,
    pub res_x: f64,
    /// Usually negative: row index grows southward
    pub res_y: f64,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub bits_per_sample: u16,
    pub photometric: Photometric,
    pub resolution_source: ResolutionSource,
    pub compression: Compression,
    pub predictor: u16,
    pub little_endian: bool,
    pub layout: BlockLayout,
    pub jpeg_tables: Option<Bytes>,
    /// Band index holding alpha, from `ExtraSamples`
    pub alpha_band: Option<usize>,
    pub nodata: Option<f64>,
}

/// Geotransform read from GeoTIFF tags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub res_x: f64,
    pub res_y: f64,
}

impl RasterLevel {
    /// Pixel size along x in world units.
    pub fn resolution(&self) -> f64 {
        self.res_x.abs()
    }

    /// Columns are stored east to west.
    pub fn flips_x(&self) -> bool {
        self.res_x < 0.0
    }

    /// Rows are stored south to north.
    pub fn flips_y(&self) -> bool {
        self.res_y > 0.0
    }

    /// Fractional pixel coordinates of a world point.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.origin_x) / self.res_x, (y - self.origin_y) / self.res_y)
    }

    /// World coordinates of a (fractional) pixel position.
    pub fn pixel_to_geo(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.origin_x + px * self.res_x,
            self.origin_y + py * self.res_y,
        )
    }

    /// World extent covered by the level.
    pub fn bounds(&self) -> GeoBounds {
        let (x0, y0) = self.pixel_to_geo(0.0, 0.0);
        let (x1, y1) = self.pixel_to_geo(self.width as f64, self.height as f64);
        GeoBounds::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bands and color model of decoded blocks. JPEG blocks come out of the
    /// decoder already converted to RGB (or gray).
    pub fn decoded_layout(&self) -> (usize, Photometric) {
        match self.compression {
            Compression::Jpeg if self.band_count >= 3 => (3, Photometric::Rgb),
            Compression::Jpeg => (1, Photometric::Gray),
            _ => (self.band_count, self.photometric),
        }
    }

    /// Alpha band of decoded blocks, if any survives decoding.
    pub fn decoded_alpha(&self) -> Option<usize> {
        match self.compression {
            Compression::Jpeg => None,
            _ => self.alpha_band,
        }
    }

    /// Build a level from an IFD. Levels without their own georeferencing
    /// take it from `base` scaled by the dimension ratio.
    pub(crate) async fn from_ifd(
        ifd: &Ifd,
        bytes: &TiffBytes,
        index: usize,
        base: Option<&RasterLevel>,
    ) -> TileResult<Self> {
        let width = require(ifd.u64_value(bytes, tiff::TAG_IMAGE_WIDTH).await?, "ImageWidth")?
            as usize;
        let height = require(ifd.u64_value(bytes, tiff::TAG_IMAGE_LENGTH).await?, "ImageLength")?
            as usize;
        if width == 0 || height == 0 {
            return Err(TileError::InvalidRaster(format!(
                "level {} has zero size {}x{}",
                index, width, height
            )));
        }

        let band_count = ifd
            .u64_value(bytes, tiff::TAG_SAMPLES_PER_PIXEL)
            .await?
            .unwrap_or(1) as usize;
        if band_count == 0 {
            return Err(TileError::InvalidRaster(format!(
                "level {} has zero samples per pixel",
                index
            )));
        }
        let bits_per_sample = ifd
            .u64_value(bytes, tiff::TAG_BITS_PER_SAMPLE)
            .await?
            .unwrap_or(1) as u16;
        if bits_per_sample != 8 && bits_per_sample != 16 {
            return Err(TileError::UnsupportedRaster(format!(
                "{} bits per sample",
                bits_per_sample
            )));
        }
        let sample_format = ifd
            .u64_value(bytes, tiff::TAG_SAMPLE_FORMAT)
            .await?
            .unwrap_or(1);
        if sample_format != 1 {
            return Err(TileError::UnsupportedRaster(format!(
                "sample format {}",
                sample_format
            )));
        }
        let planar = ifd
            .u64_value(bytes, tiff::TAG_PLANAR_CONFIG)
            .await?
            .unwrap_or(1);
        if planar != 1 && band_count > 1 {
            return Err(TileError::UnsupportedRaster(
                "separate planar configuration".into(),
            ));
        }

        let compression_tag = ifd
            .u64_value(bytes, tiff::TAG_COMPRESSION)
            .await?
            .unwrap_or(1) as u16;
        let compression = Compression::from_tag(compression_tag).ok_or_else(|| {
            TileError::UnsupportedRaster(format!("compression {}", compression_tag))
        })?;
        let predictor = ifd
            .u64_value(bytes, tiff::TAG_PREDICTOR)
            .await?
            .unwrap_or(1) as u16;
        if predictor != 1 && predictor != 2 {
            return Err(TileError::UnsupportedRaster(format!("predictor {}", predictor)));
        }

        let photometric = Photometric::from_tag(
            ifd.u64_value(bytes, tiff::TAG_PHOTOMETRIC)
                .await?
                .unwrap_or(if band_count >= 3 { 2 } else { 1 }) as u16,
        );
        if photometric == Photometric::YCbCr && compression != Compression::Jpeg {
            let subsampling = ifd
                .u64_array(bytes, tiff::TAG_YCBCR_SUBSAMPLING)
                .await?
                .unwrap_or_else(|| vec![2, 2]);
            if subsampling.iter().any(|&s| s != 1) {
                return Err(TileError::UnsupportedRaster(format!(
                    "YCbCr subsampling {:?}",
                    subsampling
                )));
            }
        }

        let alpha_band = match ifd.u64_array(bytes, tiff::TAG_EXTRA_SAMPLES).await? {
            Some(extra) => {
                let first_extra = band_count.checked_sub(extra.len()).ok_or_else(|| {
                    TileError::InvalidRaster(format!(
                        "{} extra samples in a {} band image",
                        extra.len(),
                        band_count
                    ))
                })?;
                extra
                    .iter()
                    .position(|&v| v == 1 || v == 2)
                    .map(|pos| first_extra + pos)
            }
            None => None,
        };

        let layout = read_layout(ifd, bytes, width, height).await?;

        let jpeg_tables = if compression == Compression::Jpeg {
            ifd.value_bytes(bytes, tiff::TAG_JPEG_TABLES).await?
        } else {
            None
        };

        let nodata = ifd
            .ascii(bytes, tiff::TAG_GDAL_NODATA)
            .await?
            .and_then(|s| s.parse::<f64>().ok());

        let (transform, resolution_source) = match read_geotransform(ifd, bytes).await? {
            Some(t) => (t, ResolutionSource::Declared),
            None => match base {
                Some(base) => (
                    GeoTransform {
                        origin_x: base.origin_x,
                        origin_y: base.origin_y,
                        res_x: base.res_x * base.width as f64 / width as f64,
                        res_y: base.res_y * base.height as f64 / height as f64,
                    },
                    ResolutionSource::Derived,
                ),
                None => {
                    return Err(TileError::InvalidRaster(
                        "full resolution image has no georeferencing".into(),
                    ))
                }
            },
        };

        Ok(Self {
            index,
            origin_x: transform.origin_x,
            origin_y: transform.origin_y,
            res_x: transform.res_x,
            res_y: transform.res_y,
            width,
            height,
            band_count,
            bits_per_sample,
            photometric,
            resolution_source,
            compression,
            predictor,
            little_endian: ifd.header.little_endian,
            layout,
            jpeg_tables,
            alpha_band,
            nodata,
        })
    }
}

fn require(value: Option<u64>, name: &str) -> TileResult<u64> {
    value.ok_or_else(|| TileError::InvalidRaster(format!("missing {} tag", name)))
}

async fn read_layout(
    ifd: &Ifd,
    bytes: &TiffBytes,
    width: usize,
    height: usize,
) -> TileResult<BlockLayout> {
    let (block_width, block_height, offsets, byte_counts) = if ifd.has(tiff::TAG_TILE_WIDTH) {
        (
            require(ifd.u64_value(bytes, tiff::TAG_TILE_WIDTH).await?, "TileWidth")? as usize,
            require(ifd.u64_value(bytes, tiff::TAG_TILE_LENGTH).await?, "TileLength")? as usize,
            ifd.u64_array(bytes, tiff::TAG_TILE_OFFSETS).await?,
            ifd.u64_array(bytes, tiff::TAG_TILE_BYTE_COUNTS).await?,
        )
    } else {
        let rows = ifd
            .u64_value(bytes, tiff::TAG_ROWS_PER_STRIP)
            .await?
            .map(|r| (r as usize).min(height))
            .unwrap_or(height);
        (
            width,
            rows,
            ifd.u64_array(bytes, tiff::TAG_STRIP_OFFSETS).await?,
            ifd.u64_array(bytes, tiff::TAG_STRIP_BYTE_COUNTS).await?,
        )
    };

    let offsets =
        offsets.ok_or_else(|| TileError::InvalidRaster("missing block offsets".into()))?;
    let byte_counts =
        byte_counts.ok_or_else(|| TileError::InvalidRaster("missing block byte counts".into()))?;
    if block_width == 0 || block_height == 0 {
        return Err(TileError::InvalidRaster("zero block size".into()));
    }

    let layout = BlockLayout {
        block_width,
        block_height,
        blocks_across: width.div_ceil(block_width),
        blocks_down: height.div_ceil(block_height),
        offsets,
        byte_counts,
    };
    if layout.offsets.len() < layout.block_count() || layout.byte_counts.len() < layout.block_count()
    {
        return Err(TileError::InvalidRaster(format!(
            "expected {} blocks, found {} offsets and {} byte counts",
            layout.block_count(),
            layout.offsets.len(),
            layout.byte_counts.len()
        )));
    }
    Ok(layout)
}

async fn read_geotransform(ifd: &Ifd, bytes: &TiffBytes) -> TileResult<Option<GeoTransform>> {
    let scale = ifd.f64_array(bytes, tiff::TAG_MODEL_PIXEL_SCALE).await?;
    let tiepoint = ifd.f64_array(bytes, tiff::TAG_MODEL_TIEPOINT).await?;

    if let (Some(scale), Some(tie)) = (scale, tiepoint) {
        if scale.len() >= 2 && tie.len() >= 6 && scale[0] != 0.0 && scale[1] != 0.0 {
            return Ok(Some(GeoTransform {
                origin_x: tie[3] - tie[0] * scale[0],
                origin_y: tie[4] + tie[1] * scale[1],
                res_x: scale[0],
                res_y: -scale[1],
            }));
        }
    }

    if let Some(m) = ifd.f64_array(bytes, tiff::TAG_MODEL_TRANSFORMATION).await? {
        // Rotation terms are not supported
        if m.len() >= 8 && m[1] == 0.0 && m[4] == 0.0 && m[0] != 0.0 && m[5] != 0.0 {
            return Ok(Some(GeoTransform {
                origin_x: m[3],
                origin_y: m[7],
                res_x: m[0],
                res_y: m[5],
            }));
        }
    }

    Ok(None)
}
