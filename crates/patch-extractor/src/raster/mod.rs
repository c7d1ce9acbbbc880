//! Raster collaborators: the minimal dataset interface the extractor
//! consumes, plus in-memory and GeoTIFF backends.

mod geotiff;
mod memory;

pub use geotiff::{GeoTiffOpener, GeoTiffRaster};
pub use memory::{MemoryOpener, MemoryRaster};

use ndarray::{s, Array3};
use projection::{Affine, Bounds, Crs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ExtractError, Result};
use crate::types::PixelWindow;

/// Backend options forwarded verbatim to the raster opener.
pub type RasterEnv = BTreeMap<String, String>;

/// Storage type of a raster's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleType {
    /// Whether samples are integers.
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64)
    }

    /// Size of one sample in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Get the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channel-first `[band, row, col]` samples.
///
/// Integer samples are widened to `i32` so a negative fill value survives
/// for unsigned rasters; floating point samples are kept as `f64`.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Int(Array3<i32>),
    Float(Array3<f64>),
}

impl PixelBuffer {
    /// Buffer shape as (bands, rows, cols).
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Int(data) => data.dim(),
            Self::Float(data) => data.dim(),
        }
    }
}

/// Pixels returned by [`RasterDataset::read`].
#[derive(Debug, Clone, PartialEq)]
pub struct PixelData {
    /// Sample type of the source raster.
    pub sample_type: SampleType,
    pub buffer: PixelBuffer,
}

impl PixelData {
    /// Wrap integer samples.
    pub fn int(sample_type: SampleType, data: Array3<i32>) -> Self {
        Self {
            sample_type,
            buffer: PixelBuffer::Int(data),
        }
    }

    /// Wrap floating point samples.
    pub fn float(sample_type: SampleType, data: Array3<f64>) -> Self {
        Self {
            sample_type,
            buffer: PixelBuffer::Float(data),
        }
    }

    /// Buffer shape as (bands, rows, cols).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.buffer.dim()
    }
}

/// An open, georeferenced raster.
///
/// Implementations must be safe to share between threads; a backend whose
/// reads are not concurrency-safe serializes them internally.
pub trait RasterDataset: Send + Sync {
    /// Path the raster was opened from.
    fn path(&self) -> &str;

    /// Native CRS.
    fn crs(&self) -> Crs;

    /// Native pixel -> CRS transform.
    fn transform(&self) -> Affine;

    /// Number of columns.
    fn width(&self) -> usize;

    /// Number of rows.
    fn height(&self) -> usize;

    /// Number of bands.
    fn band_count(&self) -> usize;

    /// Storage type of the samples.
    fn sample_type(&self) -> SampleType;

    /// Extent in native CRS units.
    fn bounds(&self) -> Bounds {
        let transform = self.transform();
        let (w, h) = (self.width() as f64, self.height() as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
            .map(|(col, row)| transform.apply(col, row));
        Bounds::envelope(corners).unwrap_or_else(|| Bounds::new(0.0, 0.0, 0.0, 0.0))
    }

    /// `(row, col)` of the pixel containing native coordinate `(x, y)`.
    fn index(&self, x: f64, y: f64) -> Option<(i64, i64)> {
        self.transform().index(x, y)
    }

    /// Read `window` from the 1-based `bands`.
    ///
    /// With `boundless`, pixels outside the raster take `fill_value`;
    /// otherwise a window that leaves the raster is an error.
    fn read(
        &self,
        bands: &[usize],
        window: &PixelWindow,
        boundless: bool,
        fill_value: f64,
    ) -> Result<PixelData>;
}

impl fmt::Debug for dyn RasterDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterDataset")
            .field("path", &self.path())
            .field("crs", &self.crs())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bands", &self.band_count())
            .finish()
    }
}

/// Opens rasters by path.
pub trait RasterOpener: Send + Sync {
    fn open(&self, path: &str, env: &RasterEnv) -> Result<Arc<dyn RasterDataset>>;
}

/// Part of a read window that overlaps the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Overlap {
    /// First raster column/row inside the window.
    pub src_col: usize,
    pub src_row: usize,
    /// Where that pixel lands in the output buffer.
    pub dst_col: usize,
    pub dst_row: usize,
    pub width: usize,
    pub height: usize,
}

/// Validate a read request and compute its overlap with the raster.
///
/// Returns `None` when the window lies entirely outside the raster (all
/// fill for a boundless read).
pub(crate) fn plan_read(
    dataset: &dyn RasterDataset,
    bands: &[usize],
    window: &PixelWindow,
    boundless: bool,
) -> Result<Option<Overlap>> {
    let path = dataset.path();
    if window.is_empty() {
        return Err(ExtractError::raster_io(path, window, "empty read window"));
    }
    if let Some(band) = bands
        .iter()
        .find(|b| **b == 0 || **b > dataset.band_count())
    {
        return Err(ExtractError::raster_io(
            path,
            window,
            format!("band {band} out of range 1..={}", dataset.band_count()),
        ));
    }

    let (width, height) = (dataset.width() as i64, dataset.height() as i64);
    let (min_col, min_row, max_col, max_row) = window.extents();
    let inside = min_col >= 0 && min_row >= 0 && max_col <= width && max_row <= height;
    if !boundless && !inside {
        return Err(ExtractError::raster_io(
            path,
            window,
            format!("window leaves raster of {width}x{height} pixels"),
        ));
    }

    let col0 = min_col.max(0);
    let row0 = min_row.max(0);
    let col1 = max_col.min(width);
    let row1 = max_row.min(height);
    if col0 >= col1 || row0 >= row1 {
        return Ok(None);
    }

    Ok(Some(Overlap {
        src_col: col0 as usize,
        src_row: row0 as usize,
        dst_col: (col0 - min_col) as usize,
        dst_row: (row0 - min_row) as usize,
        width: (col1 - col0) as usize,
        height: (row1 - row0) as usize,
    }))
}

/// Copy the overlapping part of band-major `source` into a fill-initialized
/// output buffer shaped for `window`.
pub(crate) fn copy_window<T: Copy>(
    source: &Array3<T>,
    bands: &[usize],
    window: &PixelWindow,
    overlap: Option<Overlap>,
    fill: T,
) -> Array3<T> {
    let mut out = Array3::from_elem(
        (bands.len(), window.height as usize, window.width as usize),
        fill,
    );
    if let Some(o) = overlap {
        for (i, band) in bands.iter().enumerate() {
            out.slice_mut(s![
                i,
                o.dst_row..o.dst_row + o.height,
                o.dst_col..o.dst_col + o.width
            ])
            .assign(&source.slice(s![
                band - 1,
                o.src_row..o.src_row + o.height,
                o.src_col..o.src_col + o.width
            ]));
        }
    }
    out
}
