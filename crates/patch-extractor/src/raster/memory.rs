//! In-memory rasters.

use projection::{Affine, Crs};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{
    copy_window, plan_read, PixelBuffer, PixelData, RasterDataset, RasterEnv, RasterOpener,
    SampleType,
};
use crate::error::{ExtractError, Result};
use crate::types::PixelWindow;

/// A raster held entirely in memory as `[band, row, col]` samples.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    path: String,
    crs: Crs,
    transform: Affine,
    data: PixelData,
}

impl MemoryRaster {
    /// Create a raster from decoded samples.
    pub fn new(
        path: impl Into<String>,
        crs: Crs,
        transform: Affine,
        data: PixelData,
    ) -> Result<Self> {
        let path = path.into();
        let (bands, rows, cols) = data.dim();
        if bands == 0 || rows == 0 || cols == 0 {
            return Err(ExtractError::open_failed(
                path,
                format!("raster has empty shape {bands}x{rows}x{cols}"),
            ));
        }
        if !transform.is_invertible() {
            return Err(ExtractError::open_failed(path, "transform is not invertible"));
        }
        Ok(Self {
            path,
            crs,
            transform,
            data,
        })
    }

    /// The raster's samples.
    pub fn data(&self) -> &PixelData {
        &self.data
    }
}

impl RasterDataset for MemoryRaster {
    fn path(&self) -> &str {
        &self.path
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn width(&self) -> usize {
        self.data.dim().2
    }

    fn height(&self) -> usize {
        self.data.dim().1
    }

    fn band_count(&self) -> usize {
        self.data.dim().0
    }

    fn sample_type(&self) -> SampleType {
        self.data.sample_type
    }

    fn read(
        &self,
        bands: &[usize],
        window: &PixelWindow,
        boundless: bool,
        fill_value: f64,
    ) -> Result<PixelData> {
        let overlap = plan_read(self, bands, window, boundless)?;
        let buffer = match &self.data.buffer {
            PixelBuffer::Int(source) => PixelBuffer::Int(copy_window(
                source,
                bands,
                window,
                overlap,
                fill_value.round() as i32,
            )),
            PixelBuffer::Float(source) => {
                PixelBuffer::Float(copy_window(source, bands, window, overlap, fill_value))
            }
        };
        Ok(PixelData {
            sample_type: self.data.sample_type,
            buffer,
        })
    }
}

/// Serves registered [`MemoryRaster`]s by path.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    rasters: RwLock<HashMap<String, Arc<MemoryRaster>>>,
    opens: AtomicUsize,
}

impl MemoryOpener {
    /// Create an opener with no rasters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raster under its path, replacing any previous one.
    pub fn insert(&self, raster: MemoryRaster) {
        self.rasters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(raster.path.clone(), Arc::new(raster));
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl RasterOpener for MemoryOpener {
    fn open(&self, path: &str, _env: &RasterEnv) -> Result<Arc<dyn RasterDataset>> {
        let rasters = self.rasters.read().unwrap_or_else(PoisonError::into_inner);
        let raster = rasters
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractError::open_failed(path, "no such in-memory raster"))?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(raster)
    }
}
