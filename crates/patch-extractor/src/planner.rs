//! Per-point window planning.
//!
//! For every point the planner finds the source pixels that cover a square
//! of `patch_size * resolution` meters around the point in its local UTM
//! zone, together with the transforms needed to warp those pixels into the
//! output patch.

use projection::{
    bounds_to_lonlat, calculate_default_transform, utm_crs_for, Bounds, CoordinateTransformer,
    Crs,
};
use rayon::prelude::*;
use std::sync::Arc;

use crate::error::{ExtractError, Result};
use crate::metrics::ExtractionMetrics;
use crate::raster::RasterDataset;
use crate::types::{GeoPoint, PixelWindow, Window};

/// Computes [`Window`]s for points on a raster.
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    transformer: Arc<CoordinateTransformer>,
}

impl WindowPlanner {
    /// Create a planner sharing `transformer`'s cache.
    pub fn new(transformer: Arc<CoordinateTransformer>) -> Self {
        Self { transformer }
    }

    /// The shared coordinate transformer.
    pub fn transformer(&self) -> &Arc<CoordinateTransformer> {
        &self.transformer
    }

    /// Check whether a lon/lat point falls within the raster's extent.
    ///
    /// Bounds are inclusive. Fails if the point cannot be expressed in the
    /// raster's CRS.
    pub fn in_bounds(&self, raster: &dyn RasterDataset, longitude: f64, latitude: f64) -> Result<bool> {
        let (x, y) = self
            .transformer
            .transform(longitude, latitude, Crs::WGS84, raster.crs())?;
        Ok(raster.bounds().contains_point(x, y))
    }

    /// Compute the window for one point.
    pub fn compute_window(
        &self,
        raster: &dyn RasterDataset,
        window_id: &str,
        longitude: f64,
        latitude: f64,
        target_image_size: usize,
        target_resolution: f64,
    ) -> Result<Window> {
        let source_crs = raster.crs();
        let target_crs = utm_crs_for(longitude, latitude);

        let (x, y) = self
            .transformer
            .transform(longitude, latitude, Crs::WGS84, target_crs)?;

        let half = (target_image_size as f64 / 2.0) * target_resolution;
        let (left, right, bottom, top) = (x - half, x + half, y - half, y + half);

        // Back into the raster's CRS; the square may come out rotated, so
        // take the envelope of all four corners
        let to_source = self.transformer.transformer(target_crs, source_crs)?;
        let corners = [(left, top), (right, top), (right, bottom), (left, bottom)]
            .into_iter()
            .map(|(cx, cy)| to_source.transform(cx, cy))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let src = Bounds::envelope(corners)
            .ok_or_else(|| ExtractError::invalid_window(window_id, "no projected corners"))?;

        // Rows grow downward while northing grows upward: the top edge
        // (largest y) gives the smallest row and the bottom edge the largest
        let top_left = raster.index(src.left, src.top);
        let bottom_right = raster.index(src.right, src.bottom);
        let ((row_a, col_a), (row_b, col_b)) = top_left.zip(bottom_right).ok_or_else(|| {
            ExtractError::invalid_window(window_id, "raster transform is not invertible")
        })?;
        let pixels = PixelWindow::from_extents(
            col_a.min(col_b),
            row_a.min(row_b),
            col_a.max(col_b),
            row_a.max(row_b),
        );
        if pixels.is_empty() {
            return Err(ExtractError::invalid_window(
                window_id,
                format!("source window {pixels} has no area"),
            ));
        }

        let source_transform = raster.transform().with_origin(src.left, src.top);
        let target = calculate_default_transform(
            &self.transformer,
            source_crs,
            target_crs,
            pixels.width as usize,
            pixels.height as usize,
            src.left,
            src.bottom,
            src.right,
            src.top,
            Some(target_resolution),
        )?;

        tracing::trace!(
            window_id,
            target_crs = %target_crs,
            window = %pixels,
            "Computed window"
        );

        Ok(Window {
            window_id: window_id.to_string(),
            pixels,
            source_crs,
            source_transform,
            target_crs,
            target_transform: target.transform,
            target_image_size,
        })
    }

    /// Plan windows for every in-bounds point on a raster.
    ///
    /// Points outside the raster are dropped silently. Points whose window
    /// cannot be computed are logged and counted but never abort the rest.
    /// Output order follows input order.
    pub fn plan_windows(
        &self,
        raster: &dyn RasterDataset,
        points: &[GeoPoint],
        target_image_size: usize,
        target_resolution: f64,
        metrics: &ExtractionMetrics,
    ) -> Vec<Window> {
        let windows: Vec<Window> = points
            .par_iter()
            .filter_map(|point| {
                match self.in_bounds(raster, point.longitude, point.latitude) {
                    Ok(true) => {}
                    Ok(false) => {
                        metrics.record_out_of_bounds();
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(
                            raster_path = %raster.path(),
                            window_id = %point.id,
                            error = %e,
                            "Bounds check failed"
                        );
                        metrics.record_planning_error();
                        return None;
                    }
                }

                match self.compute_window(
                    raster,
                    &point.id,
                    point.longitude,
                    point.latitude,
                    target_image_size,
                    target_resolution,
                ) {
                    Ok(window) => Some(window),
                    Err(e) => {
                        tracing::warn!(
                            raster_path = %raster.path(),
                            window_id = %point.id,
                            error = %e,
                            "Failed to compute window"
                        );
                        metrics.record_planning_error();
                        None
                    }
                }
            })
            .collect();

        metrics.record_windows_created(windows.len());
        tracing::debug!(
            raster_path = %raster.path(),
            points = points.len(),
            windows = windows.len(),
            "Planned windows"
        );
        windows
    }

    /// The raster's extent as a longitude/latitude box.
    pub fn raster_bounds_lonlat(&self, raster: &dyn RasterDataset) -> Result<Bounds> {
        Ok(bounds_to_lonlat(
            &self.transformer,
            &raster.bounds(),
            raster.crs(),
        )?)
    }
}
