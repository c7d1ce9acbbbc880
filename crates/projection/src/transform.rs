//! Memoized coordinate transformations between CRS pairs.
//!
//! Building a [`Transformer`] parses two PROJ.4 definitions, which is far more
//! expensive than transforming a point. [`CoordinateTransformer`] keeps one
//! transformer per `(source, target)` pair for its whole lifetime and is safe
//! to share between worker threads.

use proj4rs::proj::Proj;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::crs::Crs;
use crate::error::{ProjectionError, Result};

/// Largest absolute longitude accepted for geographic input.
const MAX_LONGITUDE: f64 = 180.0;

/// Largest absolute latitude accepted for geographic input.
const MAX_LATITUDE: f64 = 90.0;

/// A ready-to-use transformation from one CRS to another.
pub struct Transformer {
    source: Crs,
    target: Crs,
    source_proj: Proj,
    target_proj: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

impl Transformer {
    /// Build a transformer for the given CRS pair.
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        Ok(Self {
            source,
            target,
            source_proj: load_proj(source)?,
            target_proj: load_proj(target)?,
            source_geographic: source.is_geographic(),
            target_geographic: target.is_geographic(),
        })
    }

    /// Source CRS.
    pub fn source(&self) -> Crs {
        self.source
    }

    /// Target CRS.
    pub fn target(&self) -> Crs {
        self.target
    }

    /// Transform a single coordinate.
    ///
    /// Geographic coordinates are (longitude, latitude) in degrees on both
    /// input and output. Fails rather than returning NaN/inf when the point
    /// cannot be represented in the target CRS.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        self.check_input(x, y)?;

        if self.source == self.target {
            return Ok((x, y));
        }

        // proj4rs works in radians for geographic coordinates
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        proj4rs::transform::transform(&self.source_proj, &self.target_proj, &mut point)
            .map_err(|e| self.error(x, y, format!("{e:?}")))?;

        let (out_x, out_y) = if self.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(self.error(x, y, "result is not finite"));
        }

        Ok((out_x, out_y))
    }

    fn check_input(&self, x: f64, y: f64) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(self.error(x, y, "input is not finite"));
        }
        if self.source_geographic && (x.abs() > MAX_LONGITUDE || y.abs() > MAX_LATITUDE) {
            return Err(self.error(x, y, "longitude/latitude outside valid range"));
        }
        Ok(())
    }

    fn error(&self, x: f64, y: f64, message: impl Into<String>) -> ProjectionError {
        ProjectionError::reprojection(x, y, self.source, self.target, message)
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

fn load_proj(crs: Crs) -> Result<Proj> {
    let definition = crs
        .proj_string()
        .ok_or(ProjectionError::UnknownCrs(crs.epsg()))?;
    Proj::from_proj_string(definition).map_err(|e| ProjectionError::InvalidDefinition {
        crs: crs.to_string(),
        message: format!("{e:?}"),
    })
}

/// Statistics about the transformer cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Thread-safe, memoizing front end for coordinate transforms.
///
/// Intended to be created once per pipeline run and shared via `Arc`.
/// Entries are never invalidated.
#[derive(Default)]
pub struct CoordinateTransformer {
    cache: RwLock<HashMap<(Crs, Crs), Arc<Transformer>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CoordinateTransformer {
    /// Create an empty transformer cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or build and cache) the transformer for a CRS pair.
    pub fn transformer(&self, source: Crs, target: Crs) -> Result<Arc<Transformer>> {
        let key = (source, target);

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(transformer) = cache.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(transformer.clone());
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have built it while we waited for the write lock
        if let Some(transformer) = cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(transformer.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let transformer = Arc::new(Transformer::new(source, target)?);
        tracing::debug!(source = %source, target = %target, "Built coordinate transformer");
        cache.insert(key, transformer.clone());
        Ok(transformer)
    }

    /// Transform `(x, y)` from `source` to `target`.
    pub fn transform(&self, x: f64, y: f64, source: Crs, target: Crs) -> Result<(f64, f64)> {
        self.transformer(source, target)?.transform(x, y)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> TransformCacheStats {
        TransformCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Number of cached CRS pairs.
    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no transformer has been built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CoordinateTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateTransformer")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::utm_crs_for;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_wgs84_to_utm_central_meridian() {
        let transformer = CoordinateTransformer::new();
        let utm = utm_crs_for(-123.0, 0.0);
        // On the central meridian at the equator the easting is the false easting
        let (x, y) = transformer.transform(-123.0, 0.0, Crs::WGS84, utm).unwrap();
        assert!((x - 500_000.0).abs() < 1e-3, "x = {x}");
        assert!(y.abs() < 1e-3, "y = {y}");
    }

    #[test]
    fn test_roundtrip_utm() {
        let transformer = CoordinateTransformer::new();
        let utm = utm_crs_for(-122.42, 37.77);
        let (x, y) = transformer
            .transform(-122.42, 37.77, Crs::WGS84, utm)
            .unwrap();
        let (lon, lat) = transformer.transform(x, y, utm, Crs::WGS84).unwrap();
        assert!((lon + 122.42).abs() < EPS);
        assert!((lat - 37.77).abs() < EPS);
    }

    #[test]
    fn test_identity_short_circuits() {
        let transformer = CoordinateTransformer::new();
        let utm = Crs::from_epsg(32610);
        assert_eq!(
            transformer.transform(12.5, -3.25, utm, utm).unwrap(),
            (12.5, -3.25)
        );
    }

    #[test]
    fn test_out_of_domain_latitude_fails() {
        let transformer = CoordinateTransformer::new();
        let utm = Crs::from_epsg(32610);
        let err = transformer
            .transform(-123.0, 95.0, Crs::WGS84, utm)
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Reprojection { .. }));
    }

    #[test]
    fn test_non_finite_input_fails() {
        let transformer = CoordinateTransformer::new();
        let utm = Crs::from_epsg(32610);
        assert!(transformer
            .transform(f64::NAN, 10.0, Crs::WGS84, utm)
            .is_err());
        assert!(transformer
            .transform(f64::INFINITY, 10.0, utm, utm)
            .is_err());
    }

    #[test]
    fn test_unknown_crs() {
        let transformer = CoordinateTransformer::new();
        let err = transformer
            .transform(0.0, 0.0, Crs::WGS84, Crs::from_epsg(99_999))
            .unwrap_err();
        assert_eq!(err, ProjectionError::UnknownCrs(99_999));
    }

    #[test]
    fn test_cache_memoizes_pairs() {
        let transformer = CoordinateTransformer::new();
        let utm = Crs::from_epsg(32610);

        transformer.transform(-123.0, 45.0, Crs::WGS84, utm).unwrap();
        transformer.transform(-122.0, 45.0, Crs::WGS84, utm).unwrap();
        transformer.transform(500_000.0, 0.0, utm, Crs::WGS84).unwrap();

        let stats = transformer.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let transformer = Arc::new(CoordinateTransformer::new());
        let utm = Crs::from_epsg(32633);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let transformer = transformer.clone();
                std::thread::spawn(move || {
                    transformer
                        .transform(15.0, 45.0 + i as f64 * 0.1, Crs::WGS84, utm)
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            let (x, _) = handle.join().unwrap();
            assert!((x - 500_000.0).abs() < 1e-3);
        }
        assert_eq!(transformer.len(), 1);
    }
}
