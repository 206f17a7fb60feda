//! An opened Cloud-Optimized GeoTIFF.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::decode::decode_block;
use crate::level::RasterLevel;
use crate::range_reader::{RangeReader, HEADER_PREFETCH};
use crate::tiff::{self, read_ifd_chain, TiffBytes, TiffHeader};
use tile_common::{TileError, TileResult};

/// `NewSubfileType` bit marking a transparency mask.
const SUBFILE_MASK: u64 = 0x4;

/// A read-only COG with its resolution levels, finest first.
pub struct RasterSource {
    reader: Arc<dyn RangeReader>,
    levels: Vec<RasterLevel>,
}

impl RasterSource {
    /// Parse the header and every image directory of a COG.
    ///
    /// Overviews whose metadata cannot be used are skipped; only a broken
    /// full-resolution image is fatal.
    #[instrument(skip(reader), fields(source = %reader.identifier()))]
    pub async fn open(reader: Arc<dyn RangeReader>) -> TileResult<Self> {
        let prefix_len = (reader.size().min(HEADER_PREFETCH as u64)) as usize;
        let prefix = reader.read_range(0, prefix_len).await?;
        let header = TiffHeader::parse(&prefix)?;
        let bytes = TiffBytes::new(reader.clone(), prefix);

        let ifds = read_ifd_chain(&bytes, header).await?;
        let mut levels: Vec<RasterLevel> = Vec::with_capacity(ifds.len());

        for ifd in &ifds {
            let subfile = ifd
                .u64_value(&bytes, tiff::TAG_NEW_SUBFILE_TYPE)
                .await?
                .unwrap_or(0);
            if subfile & SUBFILE_MASK != 0 {
                continue;
            }

            let index = levels.len();
            match RasterLevel::from_ifd(ifd, &bytes, index, levels.first()).await {
                Ok(level) => levels.push(level),
                Err(e) if index > 0 => {
                    warn!(ifd_offset = ifd.offset, error = %e, "Skipping unreadable overview");
                }
                Err(e) => return Err(e),
            }
        }

        if levels.is_empty() {
            return Err(TileError::InvalidRaster(format!(
                "{}: no image levels",
                reader.identifier()
            )));
        }

        levels.sort_by(|a, b| b.width.cmp(&a.width));
        for (i, level) in levels.iter_mut().enumerate() {
            level.index = i;
        }

        debug!(
            levels = levels.len(),
            width = levels[0].width,
            height = levels[0].height,
            bands = levels[0].band_count,
            "Opened raster source"
        );

        Ok(Self { reader, levels })
    }

    pub fn levels(&self) -> &[RasterLevel] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> TileResult<&RasterLevel> {
        self.levels.get(index).ok_or_else(|| {
            TileError::InternalError(format!(
                "level {} out of range ({} levels)",
                index,
                self.levels.len()
            ))
        })
    }

    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    /// Fetch and decode block `(bx, by)` of a level.
    ///
    /// Sparse blocks (zero byte count) decode to zeros without a read.
    pub async fn read_block(&self, level: &RasterLevel, bx: usize, by: usize) -> TileResult<Vec<u8>> {
        let layout = &level.layout;
        if bx >= layout.blocks_across || by >= layout.blocks_down {
            return Err(TileError::InternalError(format!(
                "block {},{} outside {}x{} grid",
                bx, by, layout.blocks_across, layout.blocks_down
            )));
        }

        let index = layout.block_index(bx, by);
        let offset = layout.offsets[index];
        let length = layout.byte_counts[index] as usize;
        let (bands, _) = level.decoded_layout();

        if length == 0 {
            return Ok(vec![0; layout.block_width * layout.block_height * bands]);
        }

        let raw = self.reader.read_range(offset, length).await?;
        decode_block(level, &raw)
    }
}
