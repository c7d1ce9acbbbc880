//! Output georeferencing for a reprojected rectangle.
//!
//! Mirrors the "suggested warp output" approach used by GDAL: the edges of
//! the source rectangle are densified, every sample is reprojected, and the
//! envelope of the reprojected samples becomes the output extent.

use crate::affine::Affine;
use crate::bounds::Bounds;
use crate::crs::Crs;
use crate::error::{ProjectionError, Result};
use crate::transform::CoordinateTransformer;

/// Number of samples taken along each edge when reprojecting an extent.
pub const EDGE_SAMPLES: usize = 21;

/// Target georeferencing produced by [`calculate_default_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultTransform {
    /// Target pixel -> target CRS transform (north-up).
    pub transform: Affine,
    /// Number of target columns needed to cover the extent.
    pub width: usize,
    /// Number of target rows needed to cover the extent.
    pub height: usize,
}

/// Reproject an extent by densifying its edges.
///
/// Each edge is sampled at `densify` points (at least 2) so that curved
/// edges in the target CRS are bounded correctly.
pub fn transform_bounds(
    transformer: &CoordinateTransformer,
    bounds: &Bounds,
    source: Crs,
    target: Crs,
    densify: usize,
) -> Result<Bounds> {
    if source == target {
        return Ok(*bounds);
    }

    let steps = densify.max(2) - 1;
    let proj = transformer.transformer(source, target)?;

    let mut samples = Vec::with_capacity(4 * (steps + 1));
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = bounds.left + t * bounds.width();
        let y = bounds.bottom + t * bounds.height();
        samples.push(proj.transform(x, bounds.top)?);
        samples.push(proj.transform(x, bounds.bottom)?);
        samples.push(proj.transform(bounds.left, y)?);
        samples.push(proj.transform(bounds.right, y)?);
    }

    Bounds::envelope(samples).ok_or_else(|| {
        ProjectionError::reprojection(
            bounds.left,
            bounds.top,
            source,
            target,
            "no samples in extent",
        )
    })
}

/// Compute the target transform and size for reprojecting a source
/// rectangle of `width` x `height` pixels covering
/// `(left, bottom, right, top)` in `source` into `target`.
///
/// With an explicit `resolution` (target units per pixel) the output uses
/// square pixels of that size anchored at the top-left of the reprojected
/// extent. Without one, the resolution is chosen so that the output
/// diagonal spans as many pixels as the source diagonal.
#[allow(clippy::too_many_arguments)]
pub fn calculate_default_transform(
    transformer: &CoordinateTransformer,
    source: Crs,
    target: Crs,
    width: usize,
    height: usize,
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
    resolution: Option<f64>,
) -> Result<DefaultTransform> {
    let extent = transform_bounds(
        transformer,
        &Bounds::new(left, bottom, right, top),
        source,
        target,
        EDGE_SAMPLES,
    )?;

    let resolution = match resolution {
        Some(res) => res,
        None => {
            let source_diagonal = ((width * width + height * height) as f64).sqrt();
            let target_diagonal = extent.width().hypot(extent.height());
            target_diagonal / source_diagonal.max(1.0)
        }
    };

    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(ProjectionError::reprojection(
            left,
            top,
            source,
            target,
            format!("invalid target resolution {resolution}"),
        ));
    }

    Ok(DefaultTransform {
        transform: Affine::from_origin(extent.left, extent.top, resolution, resolution),
        width: (extent.width() / resolution).ceil().max(1.0) as usize,
        height: (extent.height() / resolution).ceil().max(1.0) as usize,
    })
}

/// Convert native raster bounds to a longitude/latitude extent.
pub fn bounds_to_lonlat(
    transformer: &CoordinateTransformer,
    bounds: &Bounds,
    crs: Crs,
) -> Result<Bounds> {
    transform_bounds(transformer, bounds, crs, Crs::WGS84, EDGE_SAMPLES)
}
