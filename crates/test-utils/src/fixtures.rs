//! Georeferenced scene fixtures.

use projection::{Affine, Bounds, CoordinateTransformer, Crs};

/// WGS 84 / UTM zone 10N
pub const UTM_10N: Crs = Crs::from_epsg(32610);

/// WGS 84 / Pseudo-Mercator
pub const WEB_MERCATOR: Crs = Crs::from_epsg(3857);

/// A north-up georeferenced scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoScene {
    pub crs: Crs,
    pub transform: Affine,
    pub width: usize,
    pub height: usize,
}

impl GeoScene {
    /// Create a scene whose top-left corner sits at `(left, top)`.
    pub fn new(crs: Crs, left: f64, top: f64, pixel_size: f64, width: usize, height: usize) -> Self {
        Self {
            crs,
            transform: Affine::from_origin(left, top, pixel_size, pixel_size),
            width,
            height,
        }
    }

    /// A scene in western Oregon, near 123°W 45°N, in UTM zone 10N.
    ///
    /// Points inside it map back to zone 10N, so patches stay on the
    /// scene's own grid.
    pub fn oregon(width: usize, height: usize, pixel_size: f64) -> Self {
        Self::new(UTM_10N, 499_000.0, 4_985_000.0, pixel_size, width, height)
    }

    /// A scene in `crs` whose center pixel sits on `(longitude, latitude)`.
    ///
    /// # Panics
    ///
    /// Panics if WGS 84 cannot be transformed to `crs`.
    pub fn centered_on(
        transformer: &CoordinateTransformer,
        crs: Crs,
        longitude: f64,
        latitude: f64,
        pixel_size: f64,
        width: usize,
        height: usize,
    ) -> Self {
        let (x, y) = transformer
            .transform(longitude, latitude, Crs::WGS84, crs)
            .expect("WGS 84 should transform to the scene CRS");
        let left = x - (width / 2) as f64 * pixel_size - pixel_size / 2.0;
        let top = y + (height / 2) as f64 * pixel_size + pixel_size / 2.0;
        Self::new(crs, left, top, pixel_size, width, height)
    }

    /// Projected coordinates of the center of pixel `(col, row)`.
    ///
    /// Indices may fall outside the scene.
    pub fn pixel_center(&self, col: i64, row: i64) -> (f64, f64) {
        self.transform.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Longitude and latitude of the center of pixel `(col, row)`.
    ///
    /// # Panics
    ///
    /// Panics if the scene CRS cannot be transformed to WGS 84.
    pub fn pixel_center_lonlat(
        &self,
        transformer: &CoordinateTransformer,
        col: i64,
        row: i64,
    ) -> (f64, f64) {
        let (x, y) = self.pixel_center(col, row);
        transformer
            .transform(x, y, self.crs, Crs::WGS84)
            .expect("scene CRS should transform to WGS 84")
    }

    /// Projected extent of the scene.
    pub fn bounds(&self) -> Bounds {
        let (left, top) = self.transform.apply(0.0, 0.0);
        let (right, bottom) = self.transform.apply(self.width as f64, self.height as f64);
        Bounds::new(left, bottom, right, top)
    }
}
