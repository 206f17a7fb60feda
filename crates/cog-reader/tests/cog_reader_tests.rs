//! Integration tests for COG parsing, level selection and windowed reads.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cog_reader::{
    compute_window, fractional_window, read_window, select_level, MemoryRangeReader, Photometric,
    RangeReader, RasterSource, ResolutionSource, SelectionStrategy, MAX_CONCURRENT_BLOCK_READS,
};
use test_utils::{
    aligned_rgb_builder, aligned_rgb_cog, assert_approx_eq, assert_coords_approx_eq, gray_ramp,
    position_rgb, solid, tile_edge, tile_origin, with_alpha, GeoTiffBuilder, TiffCompression,
    NATIVE_ZOOM, ORIGIN_TILE,
};
use tile_common::{tile_bounds, GeoBounds, TileCoord, TileError, TileResult};

/// Range reader that counts the reads it serves.
struct CountingReader {
    inner: MemoryRangeReader,
    reads: AtomicUsize,
}

impl CountingReader {
    fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemoryRangeReader::new(data, "counting"),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RangeReader for CountingReader {
    async fn read_range(&self, offset: u64, length: usize) -> TileResult<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_range(offset, length).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

async fn open(data: Vec<u8>) -> RasterSource {
    RasterSource::open(Arc::new(MemoryRangeReader::new(data, "test.tif")))
        .await
        .expect("open raster")
}

fn target_resolution(zoom: u32) -> f64 {
    tile_edge(zoom) / 256.0
}

// ============================================================================
// Opening
// ============================================================================

#[tokio::test]
async fn test_open_reads_all_levels_finest_first() {
    let source = open(aligned_rgb_cog()).await;
    let levels = source.levels();
    assert_eq!(levels.len(), 3);
    assert_eq!(
        levels.iter().map(|l| l.width).collect::<Vec<_>>(),
        vec![512, 256, 128]
    );
    // GDAL layout: geo tags on the full-resolution image only
    assert_eq!(levels[0].resolution_source, ResolutionSource::Declared);
    assert!(levels[1..]
        .iter()
        .all(|l| l.resolution_source == ResolutionSource::Derived));

    let base = &levels[0];
    assert_eq!(base.band_count, 3);
    assert_eq!(base.photometric, Photometric::Rgb);
    assert_approx_eq!(base.resolution(), target_resolution(NATIVE_ZOOM), 1e-9);
    assert!(base.res_y < 0.0);
    assert_approx_eq!(levels[2].resolution(), 4.0 * base.resolution(), 1e-9);
}

#[tokio::test]
async fn test_overviews_without_georeferencing_are_derived() {
    let source = open(aligned_rgb_builder().overview(2).build()).await;
    let overview = &source.levels()[1];
    assert_eq!(overview.resolution_source, ResolutionSource::Derived);
    assert_approx_eq!(overview.resolution(), 2.0 * source.levels()[0].resolution(), 1e-9);
    assert_eq!(overview.origin_x, source.levels()[0].origin_x);
}

#[tokio::test]
async fn test_georeferenced_overviews_are_declared() {
    let source = open(
        aligned_rgb_builder()
            .georeference_overviews(true)
            .overview(2)
            .build(),
    )
    .await;
    assert_eq!(source.levels()[1].resolution_source, ResolutionSource::Declared);
}

#[tokio::test]
async fn test_pixel_geo_round_trip() {
    let source = open(aligned_rgb_cog()).await;
    for level in source.levels() {
        let (x, y) = level.pixel_to_geo(17.25, 40.5);
        let (px, py) = level.geo_to_pixel(x, y);
        assert_coords_approx_eq!((px, py), (17.25, 40.5), 1e-6);
    }
    let (x, y) = source.levels()[0].pixel_to_geo(0.0, 0.0);
    let (west, north) = tile_origin(NATIVE_ZOOM, ORIGIN_TILE.0, ORIGIN_TILE.1);
    assert_coords_approx_eq!((x, y), (west, north), 1e-6);
}

#[tokio::test]
async fn test_mask_ifd_is_skipped() {
    let source = open(aligned_rgb_builder().mask(true).overview(2).build()).await;
    assert_eq!(source.levels().len(), 2);
    assert_eq!(source.levels()[1].band_count, 3);
}

#[tokio::test]
async fn test_open_rejects_non_tiff() {
    let reader = Arc::new(MemoryRangeReader::new(b"not a tiff at all".to_vec(), "junk"));
    let result = RasterSource::open(reader).await;
    assert!(matches!(result, Err(TileError::InvalidRaster(_))));
}

#[tokio::test]
async fn test_open_rejects_zero_samples_per_pixel() {
    let data = GeoTiffBuilder::new(64, 64, 1, gray_ramp(64, 64))
        .declared_samples_per_pixel(0)
        .build();
    let result = RasterSource::open(Arc::new(MemoryRangeReader::new(data, "zero.tif"))).await;
    assert!(matches!(result, Err(TileError::InvalidRaster(_))));
}

#[tokio::test]
async fn test_open_rejects_more_extra_samples_than_bands() {
    let data = GeoTiffBuilder::new(64, 64, 1, gray_ramp(64, 64))
        .extra_samples(&[0, 2])
        .build();
    let result = RasterSource::open(Arc::new(MemoryRangeReader::new(data, "extra.tif"))).await;
    assert!(matches!(result, Err(TileError::InvalidRaster(_))));
}

#[tokio::test]
async fn test_alpha_and_nodata_tags() {
    let rgba = with_alpha(&solid(64, 64, &[10, 20, 30]), 3, |_| 255);
    let source = open(
        GeoTiffBuilder::new(64, 64, 4, rgba)
            .alpha(true)
            .nodata("0")
            .build(),
    )
    .await;
    let level = &source.levels()[0];
    assert_eq!(level.alpha_band, Some(3));
    assert_eq!(level.nodata, Some(0.0));
}

// ============================================================================
// Resolution selection
// ============================================================================

#[tokio::test]
async fn test_select_level_by_zoom() {
    let source = open(aligned_rgb_cog()).await;
    let levels = source.levels();
    let pick = |zoom| select_level(levels, target_resolution(zoom), SelectionStrategy::default());

    assert_eq!(pick(NATIVE_ZOOM + 2), 0);
    assert_eq!(pick(NATIVE_ZOOM + 1), 0);
    assert_eq!(pick(NATIVE_ZOOM), 0);
    assert_eq!(pick(NATIVE_ZOOM - 1), 1);
    assert_eq!(pick(NATIVE_ZOOM - 2), 2);
    assert_eq!(pick(NATIVE_ZOOM - 5), 2);
}

#[tokio::test]
async fn test_selected_level_never_upsamples() {
    let source = open(aligned_rgb_cog()).await;
    let levels = source.levels();
    for zoom in 6..=14 {
        for strategy in [
            SelectionStrategy::DeclaredResolution,
            SelectionStrategy::DimensionRatio,
        ] {
            let index = select_level(levels, target_resolution(zoom), strategy);
            let level = &levels[index];
            let window = fractional_window(level, &tile_bounds(zoom, 0, 0));
            if index > 0 {
                assert!(
                    window.width() >= 256.0 - 1e-6,
                    "zoom {} level {} window {}",
                    zoom,
                    index,
                    window.width()
                );
            }
        }
    }
}

#[tokio::test]
async fn test_default_strategy_uses_dimension_ratio_for_derived_levels() {
    let source = open(aligned_rgb_builder().overview(2).overview(4).build()).await;
    let target = target_resolution(NATIVE_ZOOM - 2);

    for strategy in [
        SelectionStrategy::DeclaredResolution,
        SelectionStrategy::DimensionRatio,
    ] {
        let index = select_level(source.levels(), target, strategy);
        assert_eq!(index, 2, "{:?}", strategy);

        let coord =
            TileCoord::try_new(NATIVE_ZOOM - 2, ORIGIN_TILE.0 / 4, ORIGIN_TILE.1 / 4).unwrap();
        let window = compute_window(&source.levels()[index], &coord.bounds());
        assert_eq!((window.width(), window.height()), (128, 128));
    }
}

// ============================================================================
// Pixel windows
// ============================================================================

#[tokio::test]
async fn test_aligned_tile_maps_to_exact_window() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];

    let origin = tile_bounds(NATIVE_ZOOM, ORIGIN_TILE.0, ORIGIN_TILE.1);
    let window = compute_window(level, &origin);
    assert_eq!(
        (window.left, window.top, window.right, window.bottom),
        (0, 0, 256, 256)
    );

    let diagonal = tile_bounds(NATIVE_ZOOM, ORIGIN_TILE.0 + 1, ORIGIN_TILE.1 + 1);
    let window = compute_window(level, &diagonal);
    assert_eq!(
        (window.left, window.top, window.right, window.bottom),
        (256, 256, 512, 512)
    );
}

#[tokio::test]
async fn test_tile_outside_footprint_has_empty_window() {
    let source = open(aligned_rgb_cog()).await;
    for level in source.levels() {
        assert!(compute_window(level, &tile_bounds(10, 0, 0)).is_empty());
        // Neighbour sharing only an edge with the raster
        let east = tile_bounds(NATIVE_ZOOM, ORIGIN_TILE.0 + 2, ORIGIN_TILE.1);
        assert!(compute_window(level, &east).is_empty());
    }
}

#[tokio::test]
async fn test_partial_tile_window_is_clamped() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    // Two zooms out the raster fills the top-left quarter of its tile
    let coord = TileCoord::try_new(NATIVE_ZOOM - 2, ORIGIN_TILE.0 / 4, ORIGIN_TILE.1 / 4).unwrap();
    let window = compute_window(level, &coord.bounds());
    assert_eq!(
        (window.left, window.top, window.right, window.bottom),
        (0, 0, 512, 512)
    );
    let fractional = fractional_window(level, &coord.bounds());
    assert_approx_eq!(fractional.width(), 1024.0, 1e-6);
    assert_approx_eq!(fractional.x0, 0.0, 1e-6);
}

#[tokio::test]
async fn test_window_covers_requested_bounds() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    let full = level.bounds();
    let res = level.resolution();

    for &(dx0, dy0, dx1, dy1) in &[
        (0.3, 0.7, 17.2, 40.9),
        (100.01, 3.5, 255.99, 511.0),
        (0.0, 0.0, 511.5, 0.25),
    ] {
        let bounds = GeoBounds::new(
            full.west + dx0 * res,
            full.north - dy1 * res,
            full.west + dx1 * res,
            full.north - dy0 * res,
        );
        let window = compute_window(level, &bounds);
        let (west, north) = level.pixel_to_geo(window.left as f64, window.top as f64);
        let (east, south) = level.pixel_to_geo(window.right as f64, window.bottom as f64);
        let slack = res * 1e-6;
        assert!(west <= bounds.west + slack);
        assert!(north >= bounds.north - slack);
        assert!(east >= bounds.east - slack);
        assert!(south <= bounds.south + slack);
    }
}

// ============================================================================
// Windowed reads
// ============================================================================

#[tokio::test]
async fn test_read_native_window() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    let bounds = tile_bounds(NATIVE_ZOOM, ORIGIN_TILE.0 + 1, ORIGIN_TILE.1);
    let window = compute_window(level, &bounds);

    let block = read_window(&source, level, &window, 256, 256).await.unwrap();
    assert_eq!((block.width, block.height, block.bands), (256, 256, 3));
    assert_eq!(block.photometric, Photometric::Rgb);
    assert_eq!(block.pixel(0, 0), &[0, 0, 1]);
    assert_eq!(block.pixel(10, 5), &[10, 5, 1]);
    assert_eq!(block.pixel(255, 255), &[255, 255, 1]);
}

#[tokio::test]
async fn test_read_downsampled_window() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    let window = compute_window(level, &level.bounds());

    let block = read_window(&source, level, &window, 128, 128).await.unwrap();
    let expected = position_rgb(512, 512);
    // output pixel (x, y) samples source pixel (4x + 2, 4y + 2)
    let src = ((6 * 512) + 6) * 3;
    assert_eq!(block.pixel(1, 1), &expected[src..src + 3]);
}

#[tokio::test]
async fn test_read_fetches_each_block_once() {
    let reader = Arc::new(CountingReader::new(aligned_rgb_cog()));
    let source = RasterSource::open(reader.clone()).await.unwrap();
    let level = &source.levels()[0];
    let window = compute_window(level, &level.bounds());

    let before = reader.reads.load(Ordering::SeqCst);
    read_window(&source, level, &window, 256, 256).await.unwrap();
    // 512x512 at 128px blocks
    assert_eq!(reader.reads.load(Ordering::SeqCst) - before, 16);
}

#[tokio::test]
async fn test_read_deflate_predictor_sixteen_bit_big_endian() {
    let pixels = gray_ramp(96, 40);
    let source = open(
        GeoTiffBuilder::new(96, 40, 1, pixels)
            .tile_size(32)
            .compression(TiffCompression::Deflate)
            .predictor(true)
            .sixteen_bit(true)
            .big_endian(true)
            .build(),
    )
    .await;
    let level = &source.levels()[0];
    assert_eq!(level.photometric, Photometric::Gray);
    let window = compute_window(level, &level.bounds());

    let block = read_window(&source, level, &window, 96, 40).await.unwrap();
    assert_eq!(block.bands, 1);
    for x in [0usize, 1, 31, 32, 95] {
        assert_eq!(block.pixel(x, 39), &[x as u8]);
    }
}

#[tokio::test]
async fn test_read_rgb_predictor_uses_pixel_stride() {
    let pixels = position_rgb(64, 64);
    let source = open(
        GeoTiffBuilder::new(64, 64, 3, pixels)
            .compression(TiffCompression::Deflate)
            .predictor(true)
            .build(),
    )
    .await;
    let level = &source.levels()[0];
    let window = compute_window(level, &level.bounds());
    let block = read_window(&source, level, &window, 64, 64).await.unwrap();
    assert_eq!(block.pixel(63, 17), &[63, 17, 0]);
}

#[tokio::test]
async fn test_read_window_keeps_alpha_band() {
    let rgba = with_alpha(&solid(64, 64, &[1, 2, 3]), 3, |i| if i % 2 == 0 { 255 } else { 0 });
    let source = open(GeoTiffBuilder::new(64, 64, 4, rgba).alpha(true).build()).await;
    let level = &source.levels()[0];
    let window = compute_window(level, &level.bounds());
    let block = read_window(&source, level, &window, 64, 64).await.unwrap();
    assert_eq!(block.bands, 4);
    assert_eq!(block.alpha_band, Some(3));
    assert_eq!(block.pixel(0, 0), &[1, 2, 3, 255]);
    assert_eq!(block.pixel(1, 0), &[1, 2, 3, 0]);
}

/// Range reader that yields before answering and tracks reads in flight.
struct InFlightReader {
    inner: MemoryRangeReader,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl RangeReader for InFlightReader {
    async fn read_range(&self, offset: u64, length: usize) -> TileResult<Bytes> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let result = self.inner.read_range(offset, length).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

#[tokio::test]
async fn test_read_bounds_block_reads_in_flight() {
    // 512x512 at 16px blocks touches 1024 blocks
    let data = GeoTiffBuilder::new(512, 512, 3, position_rgb(512, 512))
        .tile_size(16)
        .build();
    let reader = Arc::new(InFlightReader {
        inner: MemoryRangeReader::new(data, "in-flight"),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let source = RasterSource::open(reader.clone()).await.unwrap();
    let level = &source.levels()[0];
    let window = compute_window(level, &level.bounds());
    reader.peak.store(0, Ordering::SeqCst);

    let block = read_window(&source, level, &window, 512, 512).await.unwrap();
    assert_eq!(block.pixel(300, 17), &[44, 17, 1]);
    let peak = reader.peak.load(Ordering::SeqCst);
    assert!(peak > 1, "reads ran one at a time");
    assert!(peak <= MAX_CONCURRENT_BLOCK_READS, "peak {}", peak);
}

#[tokio::test]
async fn test_read_south_up_level_returns_rows_north_first() {
    let source = open(
        GeoTiffBuilder::new(64, 64, 3, position_rgb(64, 64))
            .georeference(0.0, 64.0, 1.0)
            .south_up(true)
            .build(),
    )
    .await;
    let level = &source.levels()[0];
    assert!(level.flips_y());
    assert!(!level.flips_x());
    assert_approx_eq!(level.origin_y, 0.0, 1e-9);

    let window = compute_window(level, &level.bounds());
    assert_eq!((window.width(), window.height()), (64, 64));
    let block = read_window(&source, level, &window, 64, 64).await.unwrap();
    assert_eq!(block.pixel(5, 0), &[5, 0, 0]);
    assert_eq!(block.pixel(5, 63), &[5, 63, 0]);

    // Northern half of the raster
    let north = GeoBounds::new(0.0, 32.0, 64.0, 64.0);
    let window = compute_window(level, &north);
    assert_eq!((window.top, window.bottom), (32, 64));
    let block = read_window(&source, level, &window, 64, 32).await.unwrap();
    assert_eq!(block.pixel(0, 0), &[0, 0, 0]);
    assert_eq!(block.pixel(0, 31), &[0, 31, 0]);
}

#[tokio::test]
async fn test_read_empty_window_is_an_error() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    let window = compute_window(level, &tile_bounds(10, 0, 0));
    assert!(read_window(&source, level, &window, 256, 256).await.is_err());
}
