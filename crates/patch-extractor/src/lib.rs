//! Reprojected Image Patches from Large Geo-referenced Rasters
//!
//! This crate cuts fixed-size RGB patches centered on lon/lat points out of
//! large satellite scenes, reprojecting each patch into the point's local
//! UTM zone at a chosen resolution. It enables:
//!
//! - **Minimal I/O**: nearby windows are merged so one read serves many points
//! - **Bounded memory**: merged reads are capped per side
//! - **Fault isolation**: one bad point or group never stops the run
//!
//! # Architecture
//!
//! ```text
//! points (lon, lat)
//!      │
//!      ▼
//! WindowPlanner::plan_windows(raster)
//!      │
//!      ├─► Drop points outside the raster
//!      │
//!      └─► Per point: UTM square → source pixels + transforms (Window)
//!               │
//!               ▼
//! WindowGrouper::group(windows)
//!      │
//!      └─► Greedy merges over an R-tree (savings > 0, size cap)
//!               │
//!               ▼
//! RasterReader::read_group(group)
//!      │
//!      ├─► One boundless read of the group rectangle (HandlePool, BlockCache)
//!      │
//!      ├─► Clip fill, check 8-bit range
//!      │
//!      └─► Per member: slice, bilinear warp, channel-last
//!               │
//!               ▼
//!          Patch { window_id, raster_path, image }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use patch_extractor::{ExtractorConfig, GeoPoint, PatchExtractor};
//!
//! let extractor = PatchExtractor::with_geotiff(ExtractorConfig::from_env())?;
//! let points = vec![GeoPoint::from_coordinates(-122.42, 37.77)];
//!
//! let planned = extractor.plan(&["scene.tif"], &points);
//! for patch in extractor.extract_iter(&planned) {
//!     let patch = patch?;
//!     // patch.image is [row, col, channel] u8
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod grouping;
pub mod metrics;
pub mod pipeline;
pub mod planner;
pub mod raster;
pub mod reader;
pub mod types;

// Re-export commonly used types at crate root
pub use cache::{BlockCache, HandlePool};
pub use config::{parse_gdal_env, ExtractorConfig};
pub use error::{ExtractError, Result};
pub use grouping::{group_windows, SpatialIndex, WindowGroup, WindowGrouper, MAX_PATCH_SIZE};
pub use metrics::{ExtractionMetrics, ExtractionStats};
pub use pipeline::{PatchExtractor, PlanSummary, PlannedGroup};
pub use planner::WindowPlanner;
pub use raster::{
    GeoTiffOpener, GeoTiffRaster, MemoryOpener, MemoryRaster, PixelBuffer, PixelData,
    RasterDataset, RasterEnv, RasterOpener, SampleType,
};
pub use reader::{to_uint8, RasterReader};
pub use types::{point_id, CacheStats, GeoPoint, Patch, PixelWindow, Window};
