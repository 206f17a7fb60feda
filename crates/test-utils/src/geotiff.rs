//! In-memory tiled GeoTIFF writer.
//!
//! Produces COG-shaped files: level 0 first, overviews after it, each level
//! laid out as IFD, out-of-line tag values, then its tiles. Only what the
//! tile pipeline reads is written.

use std::io::Write;

/// Block compression for generated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffCompression {
    None,
    Deflate,
}

impl TiffCompression {
    fn tag_value(self) -> u16 {
        match self {
            TiffCompression::None => 1,
            TiffCompression::Deflate => 8,
        }
    }
}

struct Level {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    subfile: u32,
    /// Decimation factor relative to level 0
    factor: f64,
}

/// Builder for a synthetic Web Mercator GeoTIFF.
///
/// Pixels are supplied as chunky 8-bit samples; `sixteen_bit` widens every
/// sample to `v * 257`.
pub struct GeoTiffBuilder {
    origin_x: f64,
    origin_y: f64,
    resolution: f64,
    bands: usize,
    tile_size: usize,
    photometric: u16,
    compression: TiffCompression,
    predictor: bool,
    sixteen_bit: bool,
    big_endian: bool,
    alpha: bool,
    nodata: Option<String>,
    georeference_overviews: bool,
    south_up: bool,
    extra_samples: Option<Vec<u16>>,
    declared_samples: Option<u16>,
    mask: bool,
    levels: Vec<Level>,
}

impl GeoTiffBuilder {
    /// Start a file whose full-resolution image is `width` x `height`.
    pub fn new(width: usize, height: usize, bands: usize, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), width * height * bands, "pixel buffer size");
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            resolution: 1.0,
            bands,
            tile_size: 64,
            photometric: if bands >= 3 { 2 } else { 1 },
            compression: TiffCompression::None,
            predictor: false,
            sixteen_bit: false,
            big_endian: false,
            alpha: false,
            nodata: None,
            georeference_overviews: false,
            south_up: false,
            extra_samples: None,
            declared_samples: None,
            mask: false,
            levels: vec![Level {
                width,
                height,
                pixels,
                subfile: 0,
                factor: 1.0,
            }],
        }
    }

    /// World position of the top-left corner and level 0 pixel size.
    pub fn georeference(mut self, origin_x: f64, origin_y: f64, resolution: f64) -> Self {
        self.origin_x = origin_x;
        self.origin_y = origin_y;
        self.resolution = resolution;
        self
    }

    pub fn tile_size(mut self, size: usize) -> Self {
        assert!(size % 16 == 0, "TIFF tiles are multiples of 16");
        self.tile_size = size;
        self
    }

    pub fn photometric(mut self, value: u16) -> Self {
        self.photometric = value;
        self
    }

    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn predictor(mut self, enabled: bool) -> Self {
        self.predictor = enabled;
        self
    }

    pub fn sixteen_bit(mut self, enabled: bool) -> Self {
        self.sixteen_bit = enabled;
        self
    }

    pub fn big_endian(mut self, enabled: bool) -> Self {
        self.big_endian = enabled;
        self
    }

    /// Declare the last band as unassociated alpha.
    pub fn alpha(mut self, enabled: bool) -> Self {
        self.alpha = enabled;
        self
    }

    pub fn nodata(mut self, value: &str) -> Self {
        self.nodata = Some(value.to_string());
        self
    }

    /// Whether overview IFDs carry their own georeferencing. Off by default,
    /// as GDAL writes geo tags on the full-resolution IFD only.
    pub fn georeference_overviews(mut self, enabled: bool) -> Self {
        self.georeference_overviews = enabled;
        self
    }

    /// Write `ExtraSamples` with these values instead of deriving it from
    /// [`alpha`](Self::alpha).
    pub fn extra_samples(mut self, values: &[u16]) -> Self {
        self.extra_samples = Some(values.to_vec());
        self
    }

    /// Write this `SamplesPerPixel` regardless of the pixel layout.
    pub fn declared_samples_per_pixel(mut self, value: u16) -> Self {
        self.declared_samples = Some(value);
        self
    }

    /// Store rows south to north and declare a positive y pixel size through
    /// `ModelTransformation`. Pixels are still supplied north-up.
    pub fn south_up(mut self, enabled: bool) -> Self {
        self.south_up = enabled;
        self
    }

    /// Emit a one-band transparency mask IFD after level 0.
    pub fn mask(mut self, enabled: bool) -> Self {
        self.mask = enabled;
        self
    }

    /// Add an overview decimated from level 0 by `factor`.
    pub fn overview(mut self, factor: usize) -> Self {
        let base = &self.levels[0];
        let width = base.width.div_ceil(factor);
        let height = base.height.div_ceil(factor);
        let mut pixels = Vec::with_capacity(width * height * self.bands);
        for y in 0..height {
            for x in 0..width {
                let start = ((y * factor) * base.width + x * factor) * self.bands;
                pixels.extend_from_slice(&base.pixels[start..start + self.bands]);
            }
        }
        self.levels.push(Level {
            width,
            height,
            pixels,
            subfile: 1,
            factor: factor as f64,
        });
        self
    }

    /// Serialize the file.
    pub fn build(self) -> Vec<u8> {
        let mut out = Writer {
            buf: Vec::new(),
            be: self.big_endian,
        };
        out.buf.extend_from_slice(if self.big_endian { b"MM" } else { b"II" });
        out.u16(42);
        let mut next_ptr = out.buf.len();
        out.u32(0);

        let mut order: Vec<(usize, bool)> = vec![(0, false)];
        if self.mask {
            order.push((0, true));
        }
        order.extend((1..self.levels.len()).map(|i| (i, false)));

        for (index, is_mask) in order {
            let level = &self.levels[index];
            let ifd_offset = self.write_level(&mut out, level, is_mask);
            out.patch_u32(next_ptr, ifd_offset as u32);
            next_ptr = ifd_offset + 2 + 12 * self.entry_count(level, is_mask);
        }

        out.buf
    }

    fn entry_count(&self, level: &Level, is_mask: bool) -> usize {
        self.entries(level, is_mask, 0).len()
    }

    fn entries(&self, level: &Level, is_mask: bool, tiles: usize) -> Vec<Entry> {
        let bands = if is_mask { 1 } else { self.bands };
        let bits = if self.sixteen_bit && !is_mask { 16 } else { 8 };
        let subfile = if is_mask { 4 } else { level.subfile };

        let mut entries = vec![
            Entry::long(254, &[subfile]),
            Entry::long(256, &[level.width as u32]),
            Entry::long(257, &[level.height as u32]),
            Entry::short(258, &vec![bits; bands]),
            Entry::short(259, &[self.compression.tag_value()]),
            Entry::short(262, &[if is_mask { 4 } else { self.photometric }]),
            Entry::short(
                277,
                &[match (self.declared_samples, is_mask) {
                    (Some(declared), false) => declared,
                    _ => bands as u16,
                }],
            ),
            Entry::short(284, &[1]),
            Entry::short(322, &[self.tile_size as u16]),
            Entry::short(323, &[self.tile_size as u16]),
            Entry::long(324, &vec![0; tiles]),
            Entry::long(325, &vec![0; tiles]),
            Entry::short(339, &vec![1; bands]),
        ];
        if self.predictor && !is_mask {
            entries.push(Entry::short(317, &[2]));
        }
        if !is_mask {
            match (&self.extra_samples, self.alpha) {
                (Some(values), _) => entries.push(Entry::short(338, values)),
                (None, true) => entries.push(Entry::short(338, &[2])),
                (None, false) => {}
            }
        }

        let georeferenced = level.subfile == 0 || self.georeference_overviews;
        if georeferenced && !is_mask {
            let res = self.resolution * level.factor;
            if self.south_up {
                let south = self.origin_y - self.levels[0].height as f64 * self.resolution;
                entries.push(Entry::double(
                    34264,
                    &[
                        res, 0.0, 0.0, self.origin_x, 0.0, res, 0.0, south, 0.0, 0.0, 0.0,
                        0.0, 0.0, 0.0, 0.0, 1.0,
                    ],
                ));
            } else {
                entries.push(Entry::double(33550, &[res, res, 0.0]));
                entries.push(Entry::double(
                    33922,
                    &[0.0, 0.0, 0.0, self.origin_x, self.origin_y, 0.0],
                ));
            }
        }
        if let (Some(nodata), false) = (&self.nodata, is_mask) {
            entries.push(Entry::ascii(42113, nodata));
        }

        entries.sort_by_key(|e| e.tag);
        entries
    }

    fn encode_tiles(&self, level: &Level, is_mask: bool) -> Vec<Vec<u8>> {
        let bands = if is_mask { 1 } else { self.bands };
        let ts = self.tile_size;
        let across = level.width.div_ceil(ts);
        let down = level.height.div_ceil(ts);
        let mut tiles = Vec::with_capacity(across * down);

        for ty in 0..down {
            for tx in 0..across {
                let mut samples = vec![0u8; ts * ts * bands];
                for row in 0..ts {
                    let y = ty * ts + row;
                    if y >= level.height {
                        break;
                    }
                    for col in 0..ts {
                        let x = tx * ts + col;
                        if x >= level.width {
                            break;
                        }
                        let dst = (row * ts + col) * bands;
                        if is_mask {
                            samples[dst] = 255;
                        } else {
                            let y = if self.south_up { level.height - 1 - y } else { y };
                            let src = (y * level.width + x) * bands;
                            samples[dst..dst + bands]
                                .copy_from_slice(&level.pixels[src..src + bands]);
                        }
                    }
                }
                tiles.push(self.encode_block(samples, ts * bands, is_mask));
            }
        }
        tiles
    }

    fn encode_block(&self, samples: Vec<u8>, row_samples: usize, is_mask: bool) -> Vec<u8> {
        let wide = self.sixteen_bit && !is_mask;
        let mut values: Vec<u16> = samples
            .iter()
            .map(|&v| if wide { u16::from(v) * 257 } else { u16::from(v) })
            .collect();

        if self.predictor && !is_mask {
            for row in values.chunks_mut(row_samples) {
                for i in (self.bands..row.len()).rev() {
                    row[i] = if wide {
                        row[i].wrapping_sub(row[i - self.bands])
                    } else {
                        (row[i] as u8).wrapping_sub(row[i - self.bands] as u8) as u16
                    };
                }
            }
        }

        let mut raw = Vec::with_capacity(values.len() * if wide { 2 } else { 1 });
        for v in values {
            if wide {
                raw.extend_from_slice(&if self.big_endian {
                    v.to_be_bytes()
                } else {
                    v.to_le_bytes()
                });
            } else {
                raw.push(v as u8);
            }
        }

        match self.compression {
            TiffCompression::None => raw,
            TiffCompression::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&raw).expect("in-memory write");
                encoder.finish().expect("in-memory write")
            }
        }
    }

    fn write_level(&self, out: &mut Writer, level: &Level, is_mask: bool) -> usize {
        if out.buf.len() % 2 == 1 {
            out.buf.push(0);
        }
        let tiles = self.encode_tiles(level, is_mask);
        let mut entries = self.entries(level, is_mask, tiles.len());

        let ifd_offset = out.buf.len();
        let mut cursor = ifd_offset + 2 + 12 * entries.len() + 4;
        let mut value_offsets = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.byte_len() > 4 {
                value_offsets.push(Some(cursor));
                cursor += entry.byte_len() + entry.byte_len() % 2;
            } else {
                value_offsets.push(None);
            }
        }

        let mut tile_offsets = Vec::with_capacity(tiles.len());
        for tile in &tiles {
            tile_offsets.push(cursor as u32);
            cursor += tile.len();
        }
        let byte_counts: Vec<u32> = tiles.iter().map(|t| t.len() as u32).collect();
        for entry in entries.iter_mut() {
            match entry.tag {
                324 => *entry = Entry::long(324, &tile_offsets),
                325 => *entry = Entry::long(325, &byte_counts),
                _ => {}
            }
        }

        out.u16(entries.len() as u16);
        for (entry, value_offset) in entries.iter().zip(&value_offsets) {
            out.u16(entry.tag);
            out.u16(entry.field_type);
            out.u32(entry.count);
            match value_offset {
                Some(offset) => out.u32(*offset as u32),
                None => {
                    let mut inline = entry.encode(out.be);
                    inline.resize(4, 0);
                    out.buf.extend_from_slice(&inline);
                }
            }
        }
        out.u32(0);

        for (entry, value_offset) in entries.iter().zip(&value_offsets) {
            if value_offset.is_some() {
                out.buf.extend_from_slice(&entry.encode(out.be));
                if entry.byte_len() % 2 == 1 {
                    out.buf.push(0);
                }
            }
        }
        for tile in &tiles {
            out.buf.extend_from_slice(tile);
        }

        ifd_offset
    }
}

enum Values {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(Vec<u8>),
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    values: Values,
}

impl Entry {
    fn short(tag: u16, values: &[u16]) -> Self {
        Self {
            tag,
            field_type: 3,
            count: values.len() as u32,
            values: Values::Short(values.to_vec()),
        }
    }

    fn long(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            field_type: 4,
            count: values.len() as u32,
            values: Values::Long(values.to_vec()),
        }
    }

    fn double(tag: u16, values: &[f64]) -> Self {
        Self {
            tag,
            field_type: 12,
            count: values.len() as u32,
            values: Values::Double(values.to_vec()),
        }
    }

    fn ascii(tag: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Self {
            tag,
            field_type: 2,
            count: bytes.len() as u32,
            values: Values::Ascii(bytes),
        }
    }

    fn byte_len(&self) -> usize {
        match &self.values {
            Values::Short(v) => v.len() * 2,
            Values::Long(v) => v.len() * 4,
            Values::Double(v) => v.len() * 8,
            Values::Ascii(v) => v.len(),
        }
    }

    fn encode(&self, be: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match &self.values {
            Values::Short(v) => v.iter().for_each(|x| {
                out.extend_from_slice(&if be { x.to_be_bytes() } else { x.to_le_bytes() })
            }),
            Values::Long(v) => v.iter().for_each(|x| {
                out.extend_from_slice(&if be { x.to_be_bytes() } else { x.to_le_bytes() })
            }),
            Values::Double(v) => v.iter().for_each(|x| {
                out.extend_from_slice(&if be { x.to_be_bytes() } else { x.to_le_bytes() })
            }),
            Values::Ascii(v) => out.extend_from_slice(v),
        }
        out
    }
}

struct Writer {
    buf: Vec<u8>,
    be: bool,
}

impl Writer {
    fn u16(&mut self, v: u16) {
        let bytes = if self.be { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, v: u32) {
        let bytes = if self.be { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn patch_u32(&mut self, pos: usize, v: u32) {
        let bytes = if self.be { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf[pos..pos + 4].copy_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_first_ifd() {
        let tiff = GeoTiffBuilder::new(4, 4, 1, vec![7; 16]).tile_size(16).build();
        assert_eq!(&tiff[0..4], &[b'I', b'I', 42, 0]);
        let first_ifd = u32::from_le_bytes([tiff[4], tiff[5], tiff[6], tiff[7]]);
        assert_eq!(first_ifd, 8);
    }

    #[test]
    fn test_big_endian_header() {
        let tiff = GeoTiffBuilder::new(4, 4, 1, vec![7; 16])
            .tile_size(16)
            .big_endian(true)
            .build();
        assert_eq!(&tiff[0..4], &[b'M', b'M', 0, 42]);
    }

    #[test]
    fn test_overview_dimensions() {
        let builder = GeoTiffBuilder::new(10, 6, 1, vec![0; 60]).overview(4);
        assert_eq!(builder.levels[1].width, 3);
        assert_eq!(builder.levels[1].height, 2);
    }
}
