//! Rendering tests over synthetic rasters: conversion, placement and the
//! compositor fast path.

use std::sync::Arc;

use cog_reader::{compute_window, fractional_window, read_window, MemoryRangeReader, RasterSource};
use renderer::{
    composite, compute_placement, encode_png, to_rgba, transparent_tile, AlphaPolicy,
    OutputPlacement,
};
use test_utils::{aligned_rgb_cog, half_black, GeoTiffBuilder, NATIVE_ZOOM, ORIGIN_TILE};
use tile_common::{tile_bounds, TILE_SIZE};

async fn open(data: Vec<u8>) -> RasterSource {
    RasterSource::open(Arc::new(MemoryRangeReader::new(data, "render.tif")))
        .await
        .unwrap()
}

fn decode(png: &[u8]) -> image::RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

#[tokio::test]
async fn test_native_window_uses_fast_path() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    let bounds = tile_bounds(NATIVE_ZOOM, ORIGIN_TILE.0, ORIGIN_TILE.1 + 1);

    let window = compute_window(level, &bounds);
    let placement = compute_placement(&fractional_window(level, &bounds), &window, TILE_SIZE);
    assert!(placement.is_full(TILE_SIZE));

    let block = read_window(&source, level, &window, 256, 256).await.unwrap();
    let rgba = to_rgba(&block, AlphaPolicy { black_is_nodata: false }).unwrap();
    let direct = encode_png(&rgba, 256, 256).unwrap();
    let composited = composite(rgba, &placement, TILE_SIZE).unwrap();

    assert_eq!(composited, direct);
    let img = decode(&composited);
    assert_eq!(img.get_pixel(7, 9).0, [7, 9, 16, 255]);
}

#[tokio::test]
async fn test_partial_tile_is_padded_with_transparency() {
    let source = open(aligned_rgb_cog()).await;
    let level = &source.levels()[0];
    // Grow the raster footprint west and north so it fills the
    // bottom-right quarter of the requested area
    let footprint = tile_bounds(NATIVE_ZOOM - 1, ORIGIN_TILE.0 / 2, ORIGIN_TILE.1 / 2);
    let bounds = tile_common::GeoBounds::new(
        footprint.west - footprint.width(),
        footprint.south,
        footprint.east,
        footprint.north + footprint.height(),
    );

    let window = compute_window(level, &bounds);
    let placement = compute_placement(&fractional_window(level, &bounds), &window, TILE_SIZE);
    assert_eq!(
        placement,
        OutputPlacement {
            x: 128,
            y: 128,
            width: 128,
            height: 128
        }
    );

    let block = read_window(
        &source,
        level,
        &window,
        placement.width as usize,
        placement.height as usize,
    )
    .await
    .unwrap();
    let rgba = to_rgba(&block, AlphaPolicy::default()).unwrap();
    let img = decode(&composite(rgba, &placement, TILE_SIZE).unwrap());

    assert_eq!(img.dimensions(), (256, 256));
    assert_eq!(img.get_pixel(0, 0).0[3], 0);
    assert_eq!(img.get_pixel(127, 200).0[3], 0);
    assert_eq!(img.get_pixel(200, 50).0[3], 0);
    assert_eq!(img.get_pixel(200, 200).0[3], 255);
}

#[tokio::test]
async fn test_black_pixels_become_transparent() {
    let source = open(GeoTiffBuilder::new(64, 64, 3, half_black(64, 64, [200, 100, 50])).build()).await;
    let level = &source.levels()[0];
    let window = compute_window(level, &level.bounds());
    let block = read_window(&source, level, &window, 256, 256).await.unwrap();

    let img = decode(&composite(
        to_rgba(&block, AlphaPolicy::default()).unwrap(),
        &OutputPlacement::full(TILE_SIZE),
        TILE_SIZE,
    )
    .unwrap());
    assert_eq!(img.get_pixel(10, 10).0, [0, 0, 0, 0]);
    assert_eq!(img.get_pixel(250, 10).0, [200, 100, 50, 255]);
}

#[test]
fn test_transparent_tile_is_cached() {
    let a = transparent_tile().unwrap();
    let b = transparent_tile().unwrap();
    assert!(std::ptr::eq(a, b));
}
