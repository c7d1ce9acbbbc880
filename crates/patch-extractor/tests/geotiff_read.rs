//! Reading patches from GeoTIFF files on disk.

mod common;

use common::{config, extractor, point_at, uint8_raster, PATCH_SIZE};
use patch_extractor::{
    BlockCache, GeoTiffOpener, GeoTiffRaster, PatchExtractor, PixelBuffer, PixelWindow,
    RasterDataset, RasterEnv, RasterOpener, SampleType,
};
use std::sync::{Arc, Mutex};
use test_utils::{rgb_gradient, temp_rgb16_geotiff, temp_rgb8_geotiff, uint16_ramp, GeoScene};

/// 400 x 390 scene; 390 rows leave a short last strip
fn scene() -> GeoScene {
    GeoScene::oregon(400, 390, 1.0)
}

#[test]
fn test_geotiff_georeferencing() {
    let scene = scene();
    let pixels = rgb_gradient(scene.width, scene.height);
    let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(16));

    let cache = Arc::new(Mutex::new(BlockCache::new(16 * 1024 * 1024)));
    let raster = GeoTiffRaster::open(path.to_str().unwrap(), cache).unwrap();

    assert_eq!(raster.crs(), scene.crs);
    assert_eq!(raster.transform(), scene.transform);
    assert_eq!((raster.width(), raster.height()), (400, 390));
    assert_eq!(raster.band_count(), 3);
    assert_eq!(raster.sample_type(), SampleType::Uint8);
    assert_eq!(raster.block_size(), (400, 16));
}

#[test]
fn test_geotiff_read_matches_memory() {
    let scene = scene();
    let pixels = rgb_gradient(scene.width, scene.height);
    let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(16));
    let path = path.to_str().unwrap();

    let cache = Arc::new(Mutex::new(BlockCache::new(16 * 1024 * 1024)));
    let tiff = GeoTiffRaster::open(path, cache).unwrap();
    let memory = uint8_raster("mem://scene", &scene);

    // Crosses strip boundaries, the short last strip and the right edge
    let windows = [
        PixelWindow::new(10, 10, 40, 40),
        PixelWindow::new(350, 370, 80, 40),
        PixelWindow::new(-20, -5, 60, 30),
    ];
    for window in &windows {
        let a = tiff.read(&[1, 2, 3], window, true, -1.0).unwrap();
        let b = memory.read(&[1, 2, 3], window, true, -1.0).unwrap();
        match (a.buffer, b.buffer) {
            (PixelBuffer::Int(a), PixelBuffer::Int(b)) => assert_eq!(a, b, "window {window}"),
            _ => panic!("expected integer buffers"),
        }
    }
}

#[test]
fn test_geotiff_band_subset() {
    let scene = scene();
    let pixels = rgb_gradient(scene.width, scene.height);
    let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(32));

    let cache = Arc::new(Mutex::new(BlockCache::new(16 * 1024 * 1024)));
    let raster = GeoTiffRaster::open(path.to_str().unwrap(), cache).unwrap();
    let data = raster
        .read(&[3, 1], &PixelWindow::new(100, 200, 5, 5), false, 0.0)
        .unwrap();
    assert_eq!(data.dim(), (2, 5, 5));
    match data.buffer {
        PixelBuffer::Int(values) => {
            assert_eq!(values[[0, 2, 3]], pixels[[2, 202, 103]] as i32);
            assert_eq!(values[[1, 2, 3]], pixels[[0, 202, 103]] as i32);
        }
        _ => panic!("expected integer buffer"),
    }
}

#[test]
fn test_geotiff_extraction_matches_memory() {
    let scene = scene();
    let pixels = rgb_gradient(scene.width, scene.height);
    let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(16));
    let path = path.to_str().unwrap().to_string();

    let points = vec![
        point_at(&scene, "a", 120, 100),
        point_at(&scene, "b", 150, 110),
        point_at(&scene, "edge", 395, 385),
    ];

    let from_tiff = PatchExtractor::with_geotiff(config()).unwrap();
    let tiff_patches = from_tiff.extract(&[path.as_str()], &points).unwrap();

    let (_, from_memory) = extractor(config(), vec![uint8_raster("mem://scene", &scene)]);
    let memory_patches = from_memory.extract(&["mem://scene"], &points).unwrap();

    assert_eq!(tiff_patches.len(), 3);
    assert_eq!(tiff_patches.len(), memory_patches.len());
    for (a, b) in tiff_patches.iter().zip(&memory_patches) {
        assert_eq!(a.window_id, b.window_id);
        assert_eq!(a.image.dim(), (PATCH_SIZE, PATCH_SIZE, 3));
        assert_eq!(a.image, b.image);
    }
    assert_eq!(from_tiff.stats().raster_read_errors, 0);
}

#[test]
fn test_geotiff_uint16_out_of_range_group_is_skipped() {
    let scene = scene();
    let (_dir, wide) = temp_rgb16_geotiff(
        "wide.tif",
        &scene,
        &uint16_ramp(scene.width, scene.height),
        None,
    );
    let (_dir8, rgb) = temp_rgb8_geotiff(
        "rgb.tif",
        &scene,
        &rgb_gradient(scene.width, scene.height),
        None,
    );
    let paths = [wide.to_str().unwrap(), rgb.to_str().unwrap()];

    let extractor = PatchExtractor::with_geotiff(config()).unwrap();
    let points = vec![point_at(&scene, "a", 200, 200)];
    let patches = extractor.extract(&paths, &points).unwrap();

    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].raster_path, paths[1]);
    assert_eq!(extractor.stats().raster_read_errors, 1);
}

#[test]
fn test_block_cache_serves_repeated_reads() {
    let scene = scene();
    let pixels = rgb_gradient(scene.width, scene.height);
    let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(16));

    let opener = GeoTiffOpener::new(16 * 1024 * 1024);
    let raster = opener
        .open(path.to_str().unwrap(), &RasterEnv::new())
        .unwrap();
    let window = PixelWindow::new(0, 0, 50, 20);

    raster.read(&[1, 2, 3], &window, false, 0.0).unwrap();
    let first = opener.cache_stats();
    assert_eq!(first.misses, 2);
    assert_eq!(first.entries, 2);

    raster.read(&[1, 2, 3], &window, false, 0.0).unwrap();
    let second = opener.cache_stats();
    assert_eq!(second.misses, 2);
    assert_eq!(second.hits, 2);
}

#[test]
fn test_cachemax_option_resizes_cache() {
    let scene = scene();
    let pixels = rgb_gradient(scene.width, scene.height);
    let (_dir, path) = temp_rgb8_geotiff("scene.tif", &scene, &pixels, Some(16));

    let opener = GeoTiffOpener::new(16 * 1024 * 1024);
    let mut env = RasterEnv::new();
    env.insert("GDAL_CACHEMAX".to_string(), "0".to_string());
    let raster = opener.open(path.to_str().unwrap(), &env).unwrap();

    // Nothing fits in a zero-byte cache, but reads still succeed
    raster
        .read(&[1, 2, 3], &PixelWindow::new(0, 0, 10, 10), false, 0.0)
        .unwrap();
    assert_eq!(opener.cache_stats().entries, 0);
}

#[test]
fn test_missing_file_fails_to_open() {
    let opener = GeoTiffOpener::new(1024);
    let err = opener
        .open("/nonexistent/scene.tif", &RasterEnv::new())
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/scene.tif"));
}
