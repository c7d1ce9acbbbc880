//! Core types for window planning and patch extraction.

use ndarray::Array3;
use projection::{Affine, Crs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer pixel rectangle in a source raster's pixel space.
///
/// This is the purely geometric part of a window. It is what merge
/// arithmetic works on and what a group's bounding rectangle is; it never
/// carries CRS metadata. Columns and rows may be negative for windows that
/// hang off the raster edge (those pixels are filled on read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub column: i64,
    pub row: i64,
    pub width: i64,
    pub height: i64,
}

impl PixelWindow {
    /// Create a new pixel window.
    pub fn new(column: i64, row: i64, width: i64, height: i64) -> Self {
        Self {
            column,
            row,
            width,
            height,
        }
    }

    /// Build from (min col, min row, max col, max row) extents.
    pub fn from_extents(min_col: i64, min_row: i64, max_col: i64, max_row: i64) -> Self {
        Self::new(min_col, min_row, max_col - min_col, max_row - min_row)
    }

    /// The smallest window covering both `self` and `other`.
    pub fn expand(&self, other: &PixelWindow) -> PixelWindow {
        let (a_min_col, a_min_row, a_max_col, a_max_row) = self.extents();
        let (b_min_col, b_min_row, b_max_col, b_max_row) = other.extents();
        PixelWindow::from_extents(
            a_min_col.min(b_min_col),
            a_min_row.min(b_min_row),
            a_max_col.max(b_max_col),
            a_max_row.max(b_max_row),
        )
    }

    /// (min col, min row, max col, max row); max values are exclusive.
    pub fn extents(&self) -> (i64, i64, i64, i64) {
        (
            self.column,
            self.row,
            self.column + self.width,
            self.row + self.height,
        )
    }

    /// Number of pixels covered.
    pub fn area(&self) -> i64 {
        self.width * self.height
    }

    /// Check if `other` lies entirely inside this window.
    pub fn contains(&self, other: &PixelWindow) -> bool {
        let (min_col, min_row, max_col, max_row) = self.extents();
        let (o_min_col, o_min_row, o_max_col, o_max_row) = other.extents();
        o_min_col >= min_col && o_min_row >= min_row && o_max_col <= max_col && o_max_row <= max_row
    }

    /// Check if both dimensions are strictly positive.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "col={} row={} width={} height={}",
            self.column, self.row, self.width, self.height
        )
    }
}

/// Everything needed to extract and reproject one point's patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Caller-supplied identifier, unique per point.
    pub window_id: String,
    /// Source pixel rectangle to read.
    pub pixels: PixelWindow,
    /// CRS of the source raster.
    pub source_crs: Crs,
    /// Source pixel -> source CRS, anchored at this window's top-left
    /// corner rather than the raster's.
    pub source_transform: Affine,
    /// Local projected CRS of the output patch (the point's UTM zone).
    pub target_crs: Crs,
    /// Target pixel -> target CRS.
    pub target_transform: Affine,
    /// Edge length in pixels of the square output image.
    pub target_image_size: usize,
}

impl Window {
    /// The geometric rectangle covering this window and another.
    pub fn expand(&self, other: &Window) -> PixelWindow {
        self.pixels.expand(&other.pixels)
    }

    /// See [`PixelWindow::extents`].
    pub fn extents(&self) -> (i64, i64, i64, i64) {
        self.pixels.extents()
    }

    /// See [`PixelWindow::area`].
    pub fn area(&self) -> i64 {
        self.pixels.area()
    }
}

/// A point to extract a patch around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a point with an explicit id.
    pub fn new(id: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            id: id.into(),
            longitude,
            latitude,
        }
    }

    /// Create a point whose id is derived from its coordinates.
    pub fn from_coordinates(longitude: f64, latitude: f64) -> Self {
        Self::new(point_id(longitude, latitude), longitude, latitude)
    }
}

/// Default identifier for a point: its coordinates at full precision.
///
/// Two points only share an id if their coordinates are identical.
pub fn point_id(longitude: f64, latitude: f64) -> String {
    format!("{longitude:.16}_{latitude:.16}")
}

/// One extracted output image.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Id of the point the patch is centered on.
    pub window_id: String,
    /// Raster the pixels came from.
    pub raster_path: String,
    /// RGB pixels in `[row, col, channel]` order.
    pub image: Array3<u8>,
}

impl Patch {
    /// Image size as (width, height).
    pub fn dimensions(&self) -> (usize, usize) {
        let (rows, cols, _) = self.image.dim();
        (cols, rows)
    }

    /// Convert to an `image::RgbImage`.
    ///
    /// Returns `None` if the patch does not have exactly three channels.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        let (rows, cols, channels) = self.image.dim();
        if channels != 3 {
            return None;
        }
        let raw = self.image.as_standard_layout().iter().copied().collect();
        image::RgbImage::from_raw(cols as u32, rows as u32, raw)
    }
}

/// Statistics for the block cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
