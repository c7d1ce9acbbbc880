//! Common helpers for patch-extractor integration tests
//!
//! Provides helpers for:
//! - Building in-memory scenes on a UTM grid
//! - Creating extractors over an in-memory opener
//! - Turning pixel positions into lon/lat points

#![allow(dead_code)]

use ndarray::Array3;
use patch_extractor::{
    ExtractorConfig, GeoPoint, MemoryOpener, MemoryRaster, PatchExtractor, PixelData, SampleType,
};
use projection::CoordinateTransformer;
use std::sync::Arc;
use test_utils::{rgb_gradient, GeoScene};

/// Side length of the synthetic scenes in pixels
pub const SCENE_SIZE: usize = 1000;

/// Patch size used by most tests
pub const PATCH_SIZE: usize = 64;

/// Config for 64 px patches at the scene's 1 m resolution
pub fn config() -> ExtractorConfig {
    ExtractorConfig {
        patch_size: PATCH_SIZE,
        resolution: 1.0,
        ..Default::default()
    }
}

/// The 1000 x 1000 scene at 1 m pixels
pub fn scene() -> GeoScene {
    GeoScene::oregon(SCENE_SIZE, SCENE_SIZE, 1.0)
}

/// 8-bit gradient raster over `scene`
pub fn uint8_raster(path: &str, scene: &GeoScene) -> MemoryRaster {
    let data = rgb_gradient(scene.width, scene.height).mapv(i32::from);
    MemoryRaster::new(path, scene.crs, scene.transform, PixelData::int(SampleType::Uint8, data))
        .expect("valid raster")
}

/// 16-bit raster over `scene` holding `values`
pub fn uint16_raster(path: &str, scene: &GeoScene, values: Array3<u16>) -> MemoryRaster {
    MemoryRaster::new(
        path,
        scene.crs,
        scene.transform,
        PixelData::int(SampleType::Uint16, values.mapv(i32::from)),
    )
    .expect("valid raster")
}

/// Register `rasters` and build an extractor over them
pub fn extractor(config: ExtractorConfig, rasters: Vec<MemoryRaster>) -> (Arc<MemoryOpener>, PatchExtractor) {
    let opener = Arc::new(MemoryOpener::new());
    for raster in rasters {
        opener.insert(raster);
    }
    let extractor = PatchExtractor::new(config, opener.clone()).expect("valid config");
    (opener, extractor)
}

/// Point at the center of pixel `(col, row)` of `scene`
pub fn point_at(scene: &GeoScene, id: &str, col: i64, row: i64) -> GeoPoint {
    let transformer = CoordinateTransformer::new();
    let (lon, lat) = scene.pixel_center_lonlat(&transformer, col, row);
    GeoPoint::new(id, lon, lat)
}
