//! Block decompression and sample normalization.
//!
//! A decoded block is always `block_width * block_height * bands` bytes of
//! chunky 8-bit samples, where `bands` is what [`RasterLevel::decoded_layout`]
//! reports. Short blocks (the last strip of an image) are zero padded.

use std::io::Read;

use crate::level::{Compression, RasterLevel};
use tile_common::{TileError, TileResult};

/// Decode one compressed tile or strip of `level`.
pub fn decode_block(level: &RasterLevel, raw: &[u8]) -> TileResult<Vec<u8>> {
    let (bands, _) = level.decoded_layout();
    let pixels = level.layout.block_width * level.layout.block_height;

    let mut samples = match level.compression {
        Compression::Jpeg => decode_jpeg(raw, level.jpeg_tables.as_deref(), bands)?,
        compression => {
            let mut data = decompress(compression, raw)?;
            let row_samples = level.layout.block_width * level.band_count;
            let bytes_per_sample = level.bytes_per_sample();
            data.truncate(pixels * level.band_count * bytes_per_sample);

            if level.predictor == 2 {
                undo_horizontal_predictor(
                    &mut data,
                    row_samples,
                    level.band_count,
                    bytes_per_sample,
                    level.little_endian,
                );
            }
            normalize_to_u8(&data, level.bits_per_sample, level.little_endian)
        }
    };

    samples.resize(pixels * bands, 0);
    Ok(samples)
}

/// Undo the block compression for the non-JPEG schemes.
pub fn decompress(compression: Compression, raw: &[u8]) -> TileResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(raw.to_vec()),
        Compression::Deflate => {
            let mut decoder = flate2::read::ZlibDecoder::new(raw);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| TileError::InvalidRaster(format!("deflate: {}", e)))?;
            Ok(out)
        }
        Compression::Lzw => {
            let mut decoder =
                weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            decoder
                .decode(raw)
                .map_err(|e| TileError::InvalidRaster(format!("lzw: {}", e)))
        }
        Compression::Zstd => zstd::stream::decode_all(raw)
            .map_err(|e| TileError::InvalidRaster(format!("zstd: {}", e))),
        Compression::Jpeg => Err(TileError::InternalError(
            "JPEG blocks go through decode_jpeg".into(),
        )),
    }
}

/// Decode a JPEG block, splicing in the shared `JPEGTables` when present.
pub fn decode_jpeg(raw: &[u8], tables: Option<&[u8]>, bands: usize) -> TileResult<Vec<u8>> {
    let stream = match tables {
        // tables = SOI ... EOI, block = SOI ... EOI
        Some(tables) if tables.len() > 4 && raw.len() > 2 => {
            let mut spliced = Vec::with_capacity(tables.len() + raw.len());
            spliced.extend_from_slice(&tables[..tables.len() - 2]);
            spliced.extend_from_slice(&raw[2..]);
            spliced
        }
        _ => raw.to_vec(),
    };

    let image = image::load_from_memory_with_format(&stream, image::ImageFormat::Jpeg)
        .map_err(|e| TileError::InvalidRaster(format!("jpeg: {}", e)))?;
    Ok(if bands >= 3 {
        image.to_rgb8().into_raw()
    } else {
        image.to_luma8().into_raw()
    })
}

/// Reverse TIFF predictor 2 (horizontal differencing) in place.
///
/// Differences run between the same band of neighbouring pixels, so the
/// stride is the band count; 16-bit samples accumulate in file byte order.
pub fn undo_horizontal_predictor(
    data: &mut [u8],
    row_samples: usize,
    bands: usize,
    bytes_per_sample: usize,
    little_endian: bool,
) {
    let row_bytes = row_samples * bytes_per_sample;
    if row_bytes == 0 {
        return;
    }

    for row in data.chunks_mut(row_bytes) {
        match bytes_per_sample {
            1 => {
                for i in bands..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bands]);
                }
            }
            2 => {
                let samples = row.len() / 2;
                for i in bands..samples {
                    let prev = sample_u16(row, i - bands, little_endian);
                    let curr = sample_u16(row, i, little_endian);
                    let sum = curr.wrapping_add(prev);
                    let bytes = if little_endian {
                        sum.to_le_bytes()
                    } else {
                        sum.to_be_bytes()
                    };
                    row[i * 2..i * 2 + 2].copy_from_slice(&bytes);
                }
            }
            _ => {}
        }
    }
}

fn sample_u16(row: &[u8], index: usize, little_endian: bool) -> u16 {
    let b = [row[index * 2], row[index * 2 + 1]];
    if little_endian {
        u16::from_le_bytes(b)
    } else {
        u16::from_be_bytes(b)
    }
}

/// Reduce samples to 8 bits. 16-bit samples keep their high byte.
pub fn normalize_to_u8(data: &[u8], bits_per_sample: u16, little_endian: bool) -> Vec<u8> {
    match bits_per_sample {
        16 => data
            .chunks_exact(2)
            .map(|c| {
                if little_endian {
                    c[1]
                } else {
                    c[0]
                }
            })
            .collect(),
        _ => data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_predictor_8bit_uses_band_stride() {
        // two RGB pixels: (10,20,30) then (+1,+2,+3)
        let mut data = vec![10, 20, 30, 1, 2, 3];
        undo_horizontal_predictor(&mut data, 6, 3, 1, true);
        assert_eq!(data, vec![10, 20, 30, 11, 22, 33]);
    }

    #[test]
    fn test_predictor_resets_each_row() {
        let mut data = vec![5, 1, 7, 1];
        undo_horizontal_predictor(&mut data, 2, 1, 1, true);
        assert_eq!(data, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_predictor_16bit_big_endian() {
        let mut data = vec![0x01, 0x00, 0x00, 0xFF, 0x00, 0x01];
        undo_horizontal_predictor(&mut data, 3, 1, 2, false);
        assert_eq!(data, vec![0x01, 0x00, 0x01, 0xFF, 0x02, 0x00]);
    }

    #[test]
    fn test_predictor_16bit_carries() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x00FFu16.to_le_bytes());
        data.extend_from_slice(&0x0001u16.to_le_bytes());
        undo_horizontal_predictor(&mut data, 2, 1, 2, true);
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 0x0100);
    }

    #[test]
    fn test_normalize_16bit_keeps_high_byte() {
        let le = [0x34, 0x12, 0xFF, 0xAB];
        assert_eq!(normalize_to_u8(&le, 16, true), vec![0x12, 0xAB]);
        let be = [0x12, 0x34];
        assert_eq!(normalize_to_u8(&be, 16, false), vec![0x12]);
    }

    #[test]
    fn test_deflate_roundtrip() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(decompress(Compression::Deflate, &compressed).unwrap(), payload);
    }

    #[test]
    fn test_lzw_roundtrip() {
        let payload = b"tile tile tile tile tile".to_vec();
        let compressed = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&payload)
            .unwrap();
        assert_eq!(decompress(Compression::Lzw, &compressed).unwrap(), payload);
    }

    #[test]
    fn test_corrupt_deflate_is_an_error() {
        assert!(decompress(Compression::Deflate, &[1, 2, 3, 4]).is_err());
    }
}
