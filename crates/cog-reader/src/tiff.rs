//! TIFF and BigTIFF structure parsing.
//!
//! Only the header and the IFD chain are read here; tag values stored out of
//! line are fetched lazily through [`TiffBytes`], which serves reads from the
//! prefetched header buffer when it can.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use crate::range_reader::RangeReader;
use tile_common::{TileError, TileResult};

// TIFF tag constants
pub const TAG_NEW_SUBFILE_TYPE: u16 = 254;
pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_PHOTOMETRIC: u16 = 262;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_ROWS_PER_STRIP: u16 = 278;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_PLANAR_CONFIG: u16 = 284;
pub const TAG_PREDICTOR: u16 = 317;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub const TAG_EXTRA_SAMPLES: u16 = 338;
pub const TAG_SAMPLE_FORMAT: u16 = 339;
pub const TAG_JPEG_TABLES: u16 = 347;
pub const TAG_YCBCR_SUBSAMPLING: u16 = 530;
pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_MODEL_TRANSFORMATION: u16 = 34264;
pub const TAG_GDAL_NODATA: u16 = 42113;

// Field types
const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;
const TYPE_DOUBLE: u16 = 12;
const TYPE_LONG8: u16 = 16;

/// Upper bound on IFDs followed; real COGs carry a handful of overviews.
const MAX_IFDS: usize = 32;

/// Byte order and offset width of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub little_endian: bool,
    pub big_tiff: bool,
    pub first_ifd: u64,
}

impl TiffHeader {
    /// Parse the 8 (TIFF) or 16 (BigTIFF) byte file header.
    pub fn parse(bytes: &[u8]) -> TileResult<Self> {
        if bytes.len() < 8 {
            return Err(TileError::InvalidRaster("file shorter than TIFF header".into()));
        }
        let little_endian = match &bytes[0..2] {
            b"II" => true,
            b"MM" => false,
            _ => return Err(TileError::InvalidRaster("invalid TIFF signature".into())),
        };

        match read_u16(&bytes[2..4], little_endian) {
            42 => Ok(Self {
                little_endian,
                big_tiff: false,
                first_ifd: u64::from(read_u32(&bytes[4..8], little_endian)),
            }),
            43 => {
                if bytes.len() < 16 {
                    return Err(TileError::InvalidRaster("truncated BigTIFF header".into()));
                }
                Ok(Self {
                    little_endian,
                    big_tiff: true,
                    first_ifd: read_u64(&bytes[8..16], little_endian),
                })
            }
            version => Err(TileError::InvalidRaster(format!(
                "invalid TIFF version: {}",
                version
            ))),
        }
    }

    fn count_size(&self) -> usize {
        if self.big_tiff {
            8
        } else {
            2
        }
    }

    fn entry_size(&self) -> usize {
        if self.big_tiff {
            20
        } else {
            12
        }
    }

    fn offset_size(&self) -> usize {
        if self.big_tiff {
            8
        } else {
            4
        }
    }
}

/// Access to file bytes with the header buffer as a fast path.
pub struct TiffBytes {
    reader: Arc<dyn RangeReader>,
    prefix: Bytes,
}

impl TiffBytes {
    pub fn new(reader: Arc<dyn RangeReader>, prefix: Bytes) -> Self {
        Self { reader, prefix }
    }

    /// Read `length` bytes at `offset`.
    pub async fn at(&self, offset: u64, length: usize) -> TileResult<Bytes> {
        let start = offset as usize;
        if offset <= usize::MAX as u64 && start.saturating_add(length) <= self.prefix.len() {
            return Ok(self.prefix.slice(start..start + length));
        }
        self.reader.read_range(offset, length).await
    }
}

/// One raw IFD entry.
#[derive(Debug, Clone)]
pub struct IfdEntry {
    pub field_type: u16,
    pub count: u64,
    /// Value bytes if they fit inline, otherwise the offset bytes
    pub inline: [u8; 8],
}

impl IfdEntry {
    fn type_size(&self) -> Option<usize> {
        match self.field_type {
            TYPE_BYTE | TYPE_ASCII | TYPE_UNDEFINED => Some(1),
            TYPE_SHORT => Some(2),
            TYPE_LONG => Some(4),
            TYPE_DOUBLE | TYPE_LONG8 => Some(8),
            _ => None,
        }
    }
}

/// A parsed image file directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    pub header: TiffHeader,
    pub offset: u64,
    pub entries: HashMap<u16, IfdEntry>,
    pub next: u64,
}

impl Ifd {
    pub fn has(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Raw bytes of a tag's value, inline or fetched.
    pub async fn value_bytes(&self, bytes: &TiffBytes, tag: u16) -> TileResult<Option<Bytes>> {
        let Some(entry) = self.entries.get(&tag) else {
            return Ok(None);
        };
        let type_size = entry.type_size().ok_or_else(|| {
            TileError::UnsupportedRaster(format!(
                "tag {} has unsupported field type {}",
                tag, entry.field_type
            ))
        })?;
        let total = (entry.count as usize)
            .checked_mul(type_size)
            .ok_or_else(|| TileError::InvalidRaster(format!("tag {} count overflow", tag)))?;

        let offset_size = self.header.offset_size();
        if total <= offset_size {
            return Ok(Some(Bytes::copy_from_slice(&entry.inline[..total])));
        }
        let offset = if self.header.big_tiff {
            read_u64(&entry.inline, self.header.little_endian)
        } else {
            u64::from(read_u32(&entry.inline[..4], self.header.little_endian))
        };
        bytes.at(offset, total).await.map(Some)
    }

    /// Integer array value (BYTE, SHORT, LONG or LONG8).
    pub async fn u64_array(&self, bytes: &TiffBytes, tag: u16) -> TileResult<Option<Vec<u64>>> {
        let Some(entry) = self.entries.get(&tag) else {
            return Ok(None);
        };
        let field_type = entry.field_type;
        let Some(raw) = self.value_bytes(bytes, tag).await? else {
            return Ok(None);
        };
        let le = self.header.little_endian;
        let values = match field_type {
            TYPE_BYTE | TYPE_UNDEFINED => raw.iter().map(|&b| u64::from(b)).collect(),
            TYPE_SHORT => raw.chunks_exact(2).map(|c| u64::from(read_u16(c, le))).collect(),
            TYPE_LONG => raw.chunks_exact(4).map(|c| u64::from(read_u32(c, le))).collect(),
            TYPE_LONG8 => raw.chunks_exact(8).map(|c| read_u64(c, le)).collect(),
            other => {
                return Err(TileError::UnsupportedRaster(format!(
                    "tag {} is type {}, expected an integer",
                    tag, other
                )))
            }
        };
        Ok(Some(values))
    }

    /// First value of an integer tag.
    pub async fn u64_value(&self, bytes: &TiffBytes, tag: u16) -> TileResult<Option<u64>> {
        Ok(self
            .u64_array(bytes, tag)
            .await?
            .and_then(|v| v.first().copied()))
    }

    /// DOUBLE array value.
    pub async fn f64_array(&self, bytes: &TiffBytes, tag: u16) -> TileResult<Option<Vec<f64>>> {
        match self.entries.get(&tag) {
            Some(entry) if entry.field_type == TYPE_DOUBLE => {}
            _ => return Ok(None),
        }
        let Some(raw) = self.value_bytes(bytes, tag).await? else {
            return Ok(None);
        };
        let le = self.header.little_endian;
        Ok(Some(raw.chunks_exact(8).map(|c| read_f64(c, le)).collect()))
    }

    /// ASCII value with the trailing NUL removed.
    pub async fn ascii(&self, bytes: &TiffBytes, tag: u16) -> TileResult<Option<String>> {
        let Some(raw) = self.value_bytes(bytes, tag).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        Ok(Some(text.trim_end_matches('\0').trim().to_string()))
    }
}

/// Parse the IFD at `offset`.
pub async fn read_ifd(bytes: &TiffBytes, header: TiffHeader, offset: u64) -> TileResult<Ifd> {
    let le = header.little_endian;
    let count_bytes = bytes.at(offset, header.count_size()).await?;
    let entry_count = if header.big_tiff {
        read_u64(&count_bytes, le)
    } else {
        u64::from(read_u16(&count_bytes, le))
    } as usize;

    if entry_count == 0 || entry_count > 4096 {
        return Err(TileError::InvalidRaster(format!(
            "IFD at {} has implausible entry count {}",
            offset, entry_count
        )));
    }

    let table_len = entry_count * header.entry_size() + header.offset_size();
    let table = bytes
        .at(offset + header.count_size() as u64, table_len)
        .await?;

    let mut entries = HashMap::with_capacity(entry_count);
    for i in 0..entry_count {
        let e = &table[i * header.entry_size()..(i + 1) * header.entry_size()];
        let tag = read_u16(&e[0..2], le);
        let field_type = read_u16(&e[2..4], le);
        let (count, value) = if header.big_tiff {
            (read_u64(&e[4..12], le), &e[12..20])
        } else {
            (u64::from(read_u32(&e[4..8], le)), &e[8..12])
        };
        let mut inline = [0u8; 8];
        inline[..value.len()].copy_from_slice(value);
        entries.insert(
            tag,
            IfdEntry {
                field_type,
                count,
                inline,
            },
        );
    }

    let next_pos = entry_count * header.entry_size();
    let next = if header.big_tiff {
        read_u64(&table[next_pos..next_pos + 8], le)
    } else {
        u64::from(read_u32(&table[next_pos..next_pos + 4], le))
    };

    Ok(Ifd {
        header,
        offset,
        entries,
        next,
    })
}

/// Follow the IFD chain from the first directory.
pub async fn read_ifd_chain(bytes: &TiffBytes, header: TiffHeader) -> TileResult<Vec<Ifd>> {
    let mut ifds = Vec::new();
    let mut offset = header.first_ifd;
    while offset != 0 {
        if ifds.len() >= MAX_IFDS {
            break;
        }
        let ifd = read_ifd(bytes, header, offset).await?;
        offset = ifd.next;
        ifds.push(ifd);
    }
    if ifds.is_empty() {
        return Err(TileError::InvalidRaster("TIFF has no image directories".into()));
    }
    Ok(ifds)
}

pub fn read_u16(bytes: &[u8], little_endian: bool) -> u16 {
    let b = [bytes[0], bytes[1]];
    if little_endian {
        u16::from_le_bytes(b)
    } else {
        u16::from_be_bytes(b)
    }
}

pub fn read_u32(bytes: &[u8], little_endian: bool) -> u32 {
    let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if little_endian {
        u32::from_le_bytes(b)
    } else {
        u32::from_be_bytes(b)
    }
}

pub fn read_u64(bytes: &[u8], little_endian: bool) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[..8]);
    if little_endian {
        u64::from_le_bytes(b)
    } else {
        u64::from_be_bytes(b)
    }
}

pub fn read_f64(bytes: &[u8], little_endian: bool) -> f64 {
    f64::from_bits(read_u64(bytes, little_endian))
}
