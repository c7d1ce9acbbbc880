//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProjectionError, Result};

/// EPSG code of WGS84 geographic coordinates (longitude, latitude in degrees).
pub const WGS84_EPSG: u32 = 4326;

/// A coordinate reference system identified by its EPSG code.
///
/// CRS definitions are immutable, so a `Crs` is a plain value that can be
/// copied freely and used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Crs(u32);

impl Crs {
    /// WGS84 longitude/latitude.
    pub const WGS84: Crs = Crs(WGS84_EPSG);

    /// Create a CRS from a numeric EPSG code.
    pub const fn from_epsg(code: u32) -> Self {
        Self(code)
    }

    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:32610"
    /// - "CRS:84" (equivalent to EPSG:4326 with lon/lat axis order)
    /// - "32610"
    pub fn from_string(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase();

        if normalized == "CRS:84" || normalized == "OGC:CRS84" {
            return Ok(Self::WGS84);
        }

        let digits = normalized.strip_prefix("EPSG:").unwrap_or(&normalized);
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ProjectionError::InvalidCrs(s.to_string()))
    }

    /// The numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// PROJ.4 definition string from the crs-definitions database.
    pub fn proj_string(&self) -> Option<&'static str> {
        u16::try_from(self.0)
            .ok()
            .and_then(crs_definitions::from_code)
            .map(|def| def.proj4)
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        match self.proj_string() {
            Some(proj) => proj.contains("+proj=longlat"),
            None => self.0 == WGS84_EPSG,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl std::str::FromStr for Crs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

/// UTM zone number (1-60) containing a longitude.
///
/// Longitude 180 wraps around to zone 1.
pub fn utm_zone(longitude: f64) -> u32 {
    (((longitude + 180.0) / 6.0).floor() as i64).rem_euclid(60) as u32 + 1
}

/// The WGS84 / UTM CRS whose zone contains the point.
///
/// Northern hemisphere points (latitude >= 0) map to EPSG:326xx, southern
/// ones to EPSG:327xx.
pub fn utm_crs_for(longitude: f64, latitude: f64) -> Crs {
    let zone = utm_zone(longitude);
    if latitude >= 0.0 {
        Crs::from_epsg(32600 + zone)
    } else {
        Crs::from_epsg(32700 + zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(Crs::from_string("EPSG:4326").unwrap(), Crs::WGS84);
        assert_eq!(Crs::from_string("epsg:32610").unwrap().epsg(), 32610);
        assert_eq!(Crs::from_string("CRS:84").unwrap(), Crs::WGS84);
        assert_eq!(Crs::from_string("3857").unwrap().epsg(), 3857);
        assert!(Crs::from_string("EPSG:abc").is_err());
        assert!(Crs::from_string("").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Crs::from_epsg(32610).to_string(), "EPSG:32610");
    }

    #[test]
    fn test_is_geographic() {
        assert!(Crs::WGS84.is_geographic());
        assert!(!Crs::from_epsg(32610).is_geographic());
        assert!(!Crs::from_epsg(3857).is_geographic());
    }

    #[test]
    fn test_utm_zones() {
        assert_eq!(utm_zone(-180.0), 1);
        assert_eq!(utm_zone(-177.0), 1);
        assert_eq!(utm_zone(-123.0), 10);
        assert_eq!(utm_zone(0.0), 31);
        assert_eq!(utm_zone(179.9), 60);
        assert_eq!(utm_zone(180.0), 1);
    }

    #[test]
    fn test_utm_crs_hemisphere() {
        assert_eq!(utm_crs_for(-122.4, 37.8).epsg(), 32610);
        assert_eq!(utm_crs_for(151.2, -33.9).epsg(), 32756);
        assert_eq!(utm_crs_for(3.0, 0.0).epsg(), 32631);
    }

    #[test]
    fn test_utm_has_proj_definition() {
        let proj = utm_crs_for(-122.4, 37.8).proj_string().unwrap();
        assert!(proj.contains("+proj=utm"));
        assert!(proj.contains("+zone=10"));
    }
}
