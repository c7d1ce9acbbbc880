//! End-to-end extraction over many rasters.

use projection::CoordinateTransformer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::cache::HandlePool;
use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::grouping::{WindowGroup, WindowGrouper};
use crate::metrics::{ExtractionMetrics, ExtractionStats};
use crate::planner::WindowPlanner;
use crate::raster::{GeoTiffOpener, RasterOpener, SampleType};
use crate::reader::{RasterReader, RGB_BANDS};
use crate::types::{GeoPoint, Patch};

/// A window group bound to the raster it reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedGroup {
    pub raster_path: String,
    /// Sample type of the raster, used for byte estimates.
    pub sample_type: SampleType,
    pub group: WindowGroup,
}

impl PlannedGroup {
    /// Bytes the group read pulls from the raster.
    pub fn read_bytes(&self) -> u64 {
        self.group.area().max(0) as u64 * self.bytes_per_pixel()
    }

    /// Bytes reading every member separately would pull.
    pub fn ungrouped_bytes(&self) -> u64 {
        self.group.member_area().max(0) as u64 * self.bytes_per_pixel()
    }

    fn bytes_per_pixel(&self) -> u64 {
        (RGB_BANDS.len() * self.sample_type.size_bytes()) as u64
    }
}

/// What a plan will read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub rasters: usize,
    pub windows: usize,
    pub groups: usize,
    pub largest_group: usize,
    pub bytes_to_read: u64,
    pub bytes_without_grouping: u64,
}

impl PlanSummary {
    /// Summarize a set of planned groups.
    pub fn from_groups(planned: &[PlannedGroup]) -> Self {
        let mut rasters: Vec<&str> = planned.iter().map(|p| p.raster_path.as_str()).collect();
        rasters.sort_unstable();
        rasters.dedup();

        Self {
            rasters: rasters.len(),
            windows: planned.iter().map(|p| p.group.len()).sum(),
            groups: planned.len(),
            largest_group: planned.iter().map(|p| p.group.len()).max().unwrap_or(0),
            bytes_to_read: planned.iter().map(PlannedGroup::read_bytes).sum(),
            bytes_without_grouping: planned.iter().map(PlannedGroup::ungrouped_bytes).sum(),
        }
    }

    /// Fraction of ungrouped bytes saved by grouping (0.0 - 1.0).
    pub fn savings_ratio(&self) -> f64 {
        if self.bytes_without_grouping == 0 {
            0.0
        } else {
            1.0 - self.bytes_to_read as f64 / self.bytes_without_grouping as f64
        }
    }
}

/// Plans, groups and reads patches for points across rasters.
///
/// Owns the transform cache, handle pool and metrics for one run. Safe to
/// share between threads.
pub struct PatchExtractor {
    config: ExtractorConfig,
    planner: WindowPlanner,
    grouper: WindowGrouper,
    reader: RasterReader,
    metrics: Arc<ExtractionMetrics>,
}

impl PatchExtractor {
    /// Create an extractor reading rasters through `opener`.
    pub fn new(config: ExtractorConfig, opener: Arc<dyn RasterOpener>) -> Result<Self> {
        config.validate()?;

        let transformer = Arc::new(CoordinateTransformer::new());
        let metrics = Arc::new(ExtractionMetrics::new());
        let capacity = NonZeroUsize::new(config.handle_pool_size)
            .ok_or_else(|| ExtractError::config("handle_pool_size must be > 0"))?;
        let pool = HandlePool::new(opener, config.gdal_env.clone(), capacity);

        Ok(Self {
            planner: WindowPlanner::new(transformer.clone()),
            grouper: WindowGrouper::new(config.max_patch_size),
            reader: RasterReader::new(pool, transformer, metrics.clone()),
            metrics,
            config,
        })
    }

    /// Create an extractor for GeoTIFF files.
    pub fn with_geotiff(config: ExtractorConfig) -> Result<Self> {
        let opener = Arc::new(GeoTiffOpener::new(config.block_cache_size_bytes()));
        Self::new(config, opener)
    }

    /// The active configuration.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// The window planner.
    pub fn planner(&self) -> &WindowPlanner {
        &self.planner
    }

    /// The group reader.
    pub fn reader(&self) -> &RasterReader {
        &self.reader
    }

    /// Plan and group windows for one raster.
    pub fn plan_raster(&self, raster_path: &str, points: &[GeoPoint]) -> Result<Vec<PlannedGroup>> {
        let raster = self.reader.pool().acquire(raster_path)?;
        let windows = self.planner.plan_windows(
            raster.as_ref(),
            points,
            self.config.patch_size,
            self.config.resolution,
            &self.metrics,
        );

        let groups = self.grouper.group(windows);
        self.metrics.record_groups_created(groups.len());
        tracing::info!(
            raster_path = %raster_path,
            points = points.len(),
            groups = groups.len(),
            "Planned raster reads"
        );

        let sample_type = raster.sample_type();
        Ok(groups
            .into_iter()
            .map(|group| PlannedGroup {
                raster_path: raster_path.to_string(),
                sample_type,
                group,
            })
            .collect())
    }

    /// Plan every raster against every point.
    ///
    /// A raster that cannot be opened is logged and skipped.
    pub fn plan<S: AsRef<str>>(&self, raster_paths: &[S], points: &[GeoPoint]) -> Vec<PlannedGroup> {
        let mut planned = Vec::new();
        for path in raster_paths {
            let path = path.as_ref();
            match self.plan_raster(path, points) {
                Ok(groups) => planned.extend(groups),
                Err(e) => {
                    tracing::warn!(raster_path = %path, error = %e, "Skipping raster");
                    self.metrics.record_read_error();
                }
            }
        }
        planned
    }

    /// Read one planned group. See [`RasterReader::read_group`].
    pub fn read(&self, planned: &PlannedGroup) -> Result<Vec<Patch>> {
        self.reader.read_group(&planned.raster_path, &planned.group)
    }

    /// Lazily read groups one at a time, in plan order.
    ///
    /// Failed groups contribute no items; an internal consistency error
    /// is yielded as an `Err` item.
    pub fn extract_iter<'a>(
        &'a self,
        planned: &'a [PlannedGroup],
    ) -> impl Iterator<Item = Result<Patch>> + 'a {
        planned.iter().flat_map(move |p| match self.read(p) {
            Ok(patches) => patches.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
    }

    /// Read all groups in parallel.
    ///
    /// Patch order follows plan order. Stops at the first internal
    /// consistency error.
    pub fn extract_parallel(&self, planned: &[PlannedGroup]) -> Result<Vec<Patch>> {
        let per_group: Vec<Vec<Patch>> = planned
            .par_iter()
            .map(|p| self.read(p))
            .collect::<Result<_>>()?;
        Ok(per_group.into_iter().flatten().collect())
    }

    /// Plan and read everything in one call.
    pub fn extract<S: AsRef<str>>(&self, raster_paths: &[S], points: &[GeoPoint]) -> Result<Vec<Patch>> {
        let planned = self.plan(raster_paths, points);
        self.extract_parallel(&planned)
    }

    /// Snapshot of run metrics.
    pub fn stats(&self) -> ExtractionStats {
        self.metrics.snapshot()
    }

    /// Close every open raster.
    pub fn close(&self) {
        self.reader.close();
    }
}

impl std::fmt::Debug for PatchExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchExtractor")
            .field("config", &self.config)
            .field("reader", &self.reader)
            .finish()
    }
}
