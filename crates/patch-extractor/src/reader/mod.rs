//! Group reads: one boundless raster read per group, then per-member
//! warping into output patches.

pub mod warp;

use ndarray::Array3;
use projection::CoordinateTransformer;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::HandlePool;
use crate::error::{ExtractError, Result};
use crate::grouping::WindowGroup;
use crate::metrics::ExtractionMetrics;
use crate::raster::{PixelBuffer, PixelData};
use crate::types::Patch;

/// Color bands read from every raster (1-based).
pub const RGB_BANDS: [usize; 3] = [1, 2, 3];

/// Value for pixels outside the raster; clipped to 0 before conversion.
pub const FILL_VALUE: f64 = -1.0;

/// Convert raw samples to 8-bit.
///
/// Negative values (including the boundless fill) are clipped to 0 first.
/// Floating point rasters are rejected with [`ExtractError::PixelType`];
/// integer values above 255 with [`ExtractError::PixelRange`]. Values are
/// never rescaled or truncated.
pub fn to_uint8(data: PixelData) -> Result<Array3<u8>> {
    let mut pixels = match data.buffer {
        PixelBuffer::Int(pixels) if data.sample_type.is_integer() => pixels,
        _ => return Err(ExtractError::PixelType(data.sample_type.to_string())),
    };

    pixels.mapv_inplace(|v| v.max(0));
    let (min, max) = pixels
        .iter()
        .fold((i32::MAX, i32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !pixels.is_empty() && max > u8::MAX as i32 {
        return Err(ExtractError::PixelRange {
            min: min as i64,
            max: max as i64,
        });
    }

    Ok(pixels.mapv(|v| v as u8))
}

/// Reorder a `[band, row, col]` image to `[row, col, band]`.
pub fn to_channel_last(image: Array3<u8>) -> Array3<u8> {
    image
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned()
}

/// Reads window groups and produces patches.
pub struct RasterReader {
    pool: HandlePool,
    transformer: Arc<CoordinateTransformer>,
    metrics: Arc<ExtractionMetrics>,
}

impl RasterReader {
    /// Create a reader over a handle pool.
    pub fn new(
        pool: HandlePool,
        transformer: Arc<CoordinateTransformer>,
        metrics: Arc<ExtractionMetrics>,
    ) -> Self {
        Self {
            pool,
            transformer,
            metrics,
        }
    }

    /// The pool of open rasters.
    pub fn pool(&self) -> &HandlePool {
        &self.pool
    }

    /// Read a group and return every member's patch, or the first error.
    ///
    /// Does not record metrics.
    pub fn try_read_group(&self, raster_path: &str, group: &WindowGroup) -> Result<Vec<Patch>> {
        let raster = self.pool.acquire(raster_path)?;
        let data = raster.read(&RGB_BANDS, &group.window, true, FILL_VALUE)?;
        let pixels = to_uint8(data)?;
        let images = group.extract_images(pixels.view(), &self.transformer)?;

        Ok(images
            .into_iter()
            .map(|(window_id, image)| Patch {
                window_id,
                raster_path: raster_path.to_string(),
                image: to_channel_last(image),
            })
            .collect())
    }

    /// Read a group, isolating failures.
    ///
    /// I/O, decode, pixel type and range errors are logged and counted, and
    /// the whole group yields no patches. Internal consistency errors are
    /// returned to the caller.
    pub fn read_group(&self, raster_path: &str, group: &WindowGroup) -> Result<Vec<Patch>> {
        let start = Instant::now();
        let result = self.try_read_group(raster_path, group);
        let elapsed = start.elapsed();
        self.metrics.record_read_time(elapsed);

        match result {
            Ok(patches) => {
                self.metrics.record_group_read(patches.len());
                tracing::debug!(
                    raster_path = %raster_path,
                    group = %group.window,
                    patches = patches.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Read window group"
                );
                Ok(patches)
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(
                    raster_path = %raster_path,
                    group = %group.window,
                    error = %e,
                    "Window group violates grouping invariant"
                );
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    raster_path = %raster_path,
                    group = %group.window,
                    members = group.len(),
                    error = %e,
                    "Skipping window group"
                );
                self.metrics.record_read_error();
                Ok(Vec::new())
            }
        }
    }

    /// Close every open raster.
    pub fn close(&self) {
        self.pool.close_all();
    }
}

impl std::fmt::Debug for RasterReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterReader")
            .field("pool", &self.pool)
            .finish()
    }
}
