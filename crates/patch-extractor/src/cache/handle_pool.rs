//! Bounded pool of open raster handles keyed by path.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::raster::{RasterDataset, RasterEnv, RasterOpener};

/// Keeps up to `capacity` rasters open, evicting the least recently used.
///
/// Evicted handles stay alive until every in-flight read holding them
/// finishes, since callers receive `Arc`s.
pub struct HandlePool {
    opener: Arc<dyn RasterOpener>,
    env: RasterEnv,
    handles: Mutex<LruCache<String, Arc<dyn RasterDataset>>>,
    hits: AtomicU64,
    opens: AtomicU64,
}

impl HandlePool {
    /// Create a pool that opens rasters through `opener` with `env`.
    pub fn new(opener: Arc<dyn RasterOpener>, env: RasterEnv, capacity: NonZeroUsize) -> Self {
        Self {
            opener,
            env,
            handles: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            opens: AtomicU64::new(0),
        }
    }

    /// Get the open handle for `path`, opening it on a miss.
    pub fn acquire(&self, path: &str) -> Result<Arc<dyn RasterDataset>> {
        if let Some(handle) = self.lock().get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(handle.clone());
        }

        // Open without holding the lock; remote opens can be slow
        let opened = self.opener.open(path, &self.env)?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(raster_path = %path, "Opened raster");

        let mut handles = self.lock();
        if let Some(existing) = handles.get(path) {
            return Ok(existing.clone());
        }
        if let Some((evicted, _)) = handles.push(path.to_string(), opened.clone()) {
            if evicted != path {
                tracing::debug!(raster_path = %evicted, "Evicted raster handle");
            }
        }
        Ok(opened)
    }

    /// Drop every pooled handle.
    pub fn close_all(&self) {
        let mut handles = self.lock();
        let count = handles.len();
        handles.clear();
        if count > 0 {
            tracing::debug!(count, "Closed raster handles");
        }
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no handle is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of acquisitions served from the pool.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of rasters opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Backend options passed to every open.
    pub fn env(&self) -> &RasterEnv {
        &self.env
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<dyn RasterDataset>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HandlePool {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for HandlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool")
            .field("open", &self.len())
            .field("hits", &self.hits())
            .field("opens", &self.opens())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::raster::{MemoryOpener, MemoryRaster, PixelData, SampleType};
    use ndarray::Array3;
    use projection::{Affine, Crs};

    fn opener_with(paths: &[&str]) -> Arc<MemoryOpener> {
        let opener = Arc::new(MemoryOpener::new());
        for path in paths {
            let data = PixelData::int(SampleType::Uint8, Array3::zeros((3, 4, 4)));
            opener.insert(
                MemoryRaster::new(*path, Crs::from_epsg(32610), Affine::identity(), data)
                    .unwrap(),
            );
        }
        opener
    }

    #[test]
    fn test_reuses_open_handle() {
        let opener = opener_with(&["a"]);
        let pool = HandlePool::new(opener.clone(), RasterEnv::new(), NonZeroUsize::new(4).unwrap());

        let first = pool.acquire("a").unwrap();
        let second = pool.acquire("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opener.open_count(), 1);
        assert_eq!(pool.hits(), 1);
        assert_eq!(pool.opens(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let opener = opener_with(&["a", "b", "c"]);
        let pool = HandlePool::new(opener.clone(), RasterEnv::new(), NonZeroUsize::new(2).unwrap());

        pool.acquire("a").unwrap();
        pool.acquire("b").unwrap();
        pool.acquire("a").unwrap();
        pool.acquire("c").unwrap();
        assert_eq!(pool.len(), 2);

        // "b" was evicted and must be reopened
        pool.acquire("b").unwrap();
        assert_eq!(opener.open_count(), 4);
    }

    #[test]
    fn test_open_failure_is_not_cached() {
        let opener = opener_with(&[]);
        let pool = HandlePool::new(opener, RasterEnv::new(), NonZeroUsize::new(2).unwrap());
        let err = pool.acquire("missing").unwrap_err();
        assert!(matches!(err, ExtractError::OpenFailed { .. }));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_close_all() {
        let opener = opener_with(&["a", "b"]);
        let pool = HandlePool::new(opener, RasterEnv::new(), NonZeroUsize::new(4).unwrap());
        pool.acquire("a").unwrap();
        pool.acquire("b").unwrap();
        assert_eq!(pool.len(), 2);

        pool.close_all();
        assert!(pool.is_empty());
    }
}
