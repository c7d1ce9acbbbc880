//! Coordinate reference system handling for patch extraction.
//!
//! Provides CRS identifiers backed by the EPSG database, affine pixel
//! transforms, UTM zone selection and a thread-safe, memoizing
//! coordinate transformer built on proj4rs.

pub mod affine;
pub mod bounds;
pub mod crs;
pub mod default_transform;
pub mod error;
pub mod transform;

pub use affine::Affine;
pub use bounds::Bounds;
pub use crs::{utm_crs_for, utm_zone, Crs, WGS84_EPSG};
pub use default_transform::{
    bounds_to_lonlat, calculate_default_transform, transform_bounds, DefaultTransform,
    EDGE_SAMPLES,
};
pub use error::{ProjectionError, Result};
pub use transform::{CoordinateTransformer, TransformCacheStats, Transformer};
