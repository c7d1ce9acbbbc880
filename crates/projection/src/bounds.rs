//! Rectangular extents in CRS units.

use serde::{Deserialize, Serialize};

/// An axis-aligned extent expressed in the units of some CRS.
///
/// For geographic CRS (EPSG:4326) the units are degrees, for projected CRS
/// (UTM, Web Mercator) they are meters. `top` is the largest northing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    /// Create a new extent from its edges.
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// The smallest extent covering every point in `points`.
    ///
    /// Returns `None` for an empty iterator.
    pub fn envelope(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let mut bounds = Self::new(x0, y0, x0, y0);
        for (x, y) in iter {
            bounds.left = bounds.left.min(x);
            bounds.right = bounds.right.max(x);
            bounds.bottom = bounds.bottom.min(y);
            bounds.top = bounds.top.max(y);
        }
        Some(bounds)
    }

    /// Width in coordinate units.
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Height in coordinate units.
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Check if a point lies inside the extent (edges included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.left <= x && x <= self.right && self.bottom <= y && y <= self.top
    }

    /// Check if this extent overlaps another.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.bottom < other.top
            && self.top > other.bottom
    }

    /// The four corners as (x, y): top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.left, self.top),
            (self.right, self.top),
            (self.right, self.bottom),
            (self.left, self.bottom),
        ]
    }
}
