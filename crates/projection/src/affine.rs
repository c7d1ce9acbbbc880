//! Six-parameter affine transforms between pixel and CRS coordinates.
//!
//! Uses the same coefficient naming as GDAL/rasterio:
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! For a north-up raster `b == d == 0` and `e` is negative, so row indices
//! grow downward while northing decreases.

use serde::{Deserialize, Serialize};

/// Affine mapping from (col, row) pixel space to (x, y) CRS space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    /// Create a transform from its six coefficients.
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// The identity transform.
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// A north-up transform with square-or-rectangular pixels anchored at
    /// the top-left corner `(left, top)`.
    pub fn from_origin(left: f64, top: f64, x_res: f64, y_res: f64) -> Self {
        Self::new(x_res, 0.0, left, 0.0, -y_res, top)
    }

    /// Build from a GDAL geotransform array
    /// `[c, a, b, f, d, e]`.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    /// Same pixel scale and rotation, but with the origin moved to `(c, f)`.
    pub fn with_origin(&self, c: f64, f: f64) -> Self {
        Self { c, f, ..*self }
    }

    /// Map a (col, row) pixel coordinate to (x, y).
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Check if the transform can be inverted.
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > f64::EPSILON * 1e-6
    }

    /// The inverse transform mapping (x, y) back to (col, row).
    ///
    /// Returns `None` for a degenerate transform.
    pub fn inverse(&self) -> Option<Self> {
        if !self.is_invertible() {
            return None;
        }
        let det = self.determinant();
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Some(Self::new(
            ia,
            ib,
            -(ia * self.c + ib * self.f),
            id,
            ie,
            -(id * self.c + ie * self.f),
        ))
    }

    /// Fractional (col, row) for a CRS coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.inverse().map(|inv| inv.apply(x, y))
    }

    /// Integer (row, col) of the pixel containing `(x, y)`.
    ///
    /// Uses floor rounding: a coordinate exactly on a pixel edge belongs to
    /// the pixel to its right/below.
    pub fn index(&self, x: f64, y: f64) -> Option<(i64, i64)> {
        let (col, row) = self.to_pixel(x, y)?;
        Some((row.floor() as i64, col.floor() as i64))
    }

    /// Pixel width along x (absolute value of `a` for north-up rasters).
    pub fn x_resolution(&self) -> f64 {
        (self.a * self.a + self.d * self.d).sqrt()
    }

    /// Pixel height along y.
    pub fn y_resolution(&self) -> f64 {
        (self.b * self.b + self.e * self.e).sqrt()
    }

    /// Check if the transform has no rotation terms.
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}
