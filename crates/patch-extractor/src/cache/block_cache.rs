//! LRU cache for decoded raster blocks (strips or tiles).

use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::CacheStats;

/// Cache key for blocks: (raster_path_hash, block_index).
pub type BlockKey = (u64, usize);

/// Samples of one decoded block, pixel-interleaved.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockSamples {
    Int(Vec<i32>),
    Float(Vec<f64>),
}

/// A decoded strip or tile.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    /// Columns of valid data in the block.
    pub width: usize,
    /// Rows of valid data in the block.
    pub height: usize,
    pub samples_per_pixel: usize,
    pub samples: BlockSamples,
}

impl DecodedBlock {
    /// Approximate heap size in bytes.
    pub fn size_bytes(&self) -> usize {
        match &self.samples {
            BlockSamples::Int(v) => v.len() * std::mem::size_of::<i32>(),
            BlockSamples::Float(v) => v.len() * std::mem::size_of::<f64>(),
        }
    }
}

/// LRU cache for decoded blocks with memory-bounded eviction.
///
/// Shared by every raster opened through one opener, so the memory limit
/// applies across rasters.
pub struct BlockCache {
    cache: LruCache<BlockKey, Arc<DecodedBlock>>,
    memory_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    /// Create a new block cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            // Bounded by memory_limit rather than entry count
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Try to get a block from the cache.
    pub fn get(&mut self, key: &BlockKey) -> Option<Arc<DecodedBlock>> {
        if let Some(block) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(block.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a block, evicting least recently used blocks to make room.
    ///
    /// Blocks larger than the whole budget are not cached.
    pub fn insert(&mut self, key: BlockKey, block: Arc<DecodedBlock>) {
        let size = block.size_bytes();
        if size > self.memory_limit {
            return;
        }

        if let Some(old) = self.cache.pop(&key) {
            self.current_memory = self.current_memory.saturating_sub(old.size_bytes());
        }

        while self.current_memory + size > self.memory_limit {
            match self.cache.pop_lru() {
                Some((_, evicted)) => {
                    self.current_memory = self.current_memory.saturating_sub(evicted.size_bytes());
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        self.cache.put(key, block);
        self.current_memory += size;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    /// Change the memory limit, evicting down to it if needed.
    ///
    /// Returns the number of entries evicted.
    pub fn set_memory_limit(&mut self, memory_limit: usize) -> usize {
        self.memory_limit = memory_limit;
        self.evict_to_target(memory_limit)
    }

    /// Evict entries to reach target memory usage.
    ///
    /// Returns the number of entries evicted.
    pub fn evict_to_target(&mut self, target_bytes: usize) -> usize {
        let mut evicted = 0;
        while self.current_memory > target_bytes {
            match self.cache.pop_lru() {
                Some((_, block)) => {
                    self.current_memory = self.current_memory.saturating_sub(block.size_bytes());
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get the memory limit in bytes.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Hash a raster path for use in a [`BlockKey`].
pub fn hash_path(path: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(values: usize) -> Arc<DecodedBlock> {
        Arc::new(DecodedBlock {
            width: values,
            height: 1,
            samples_per_pixel: 1,
            samples: BlockSamples::Int(vec![7; values]),
        })
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = BlockCache::new(1024 * 1024);
        let key = (123, 0);

        assert!(cache.get(&key).is_none());
        cache.insert(key, block(4));
        assert_eq!(cache.get(&key).unwrap().width, 4);
        assert_eq!(cache.memory_usage(), 16);
    }

    #[test]
    fn test_cache_lru_eviction() {
        // Room for four 16-byte blocks
        let mut cache = BlockCache::new(64);
        for i in 0..10 {
            cache.insert((0, i), block(4));
        }

        assert!(cache.get(&(0, 0)).is_none());
        assert!(cache.get(&(0, 9)).is_some());
        assert_eq!(cache.len(), 4);
        assert!(cache.memory_usage() <= cache.memory_limit());
        assert_eq!(cache.stats().evictions, 6);
    }

    #[test]
    fn test_recently_used_survives() {
        let mut cache = BlockCache::new(32);
        cache.insert((0, 0), block(4));
        cache.insert((0, 1), block(4));
        cache.get(&(0, 0));
        cache.insert((0, 2), block(4));

        assert!(cache.contains(&(0, 0)));
        assert!(!cache.contains(&(0, 1)));
    }

    #[test]
    fn test_oversized_block_not_cached() {
        let mut cache = BlockCache::new(8);
        cache.insert((0, 0), block(4));
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_reinsert_replaces_size() {
        let mut cache = BlockCache::new(1024);
        cache.insert((0, 0), block(4));
        cache.insert((0, 0), block(8));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 32);
    }

    #[test]
    fn test_cache_stats() {
        let mut cache = BlockCache::new(1024 * 1024);
        cache.insert((0, 0), block(4));

        cache.get(&(0, 0));
        cache.get(&(0, 1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = BlockCache::new(1024 * 1024);
        cache.insert((0, 0), block(4));

        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_shrinking_limit_evicts() {
        let mut cache = BlockCache::new(1024);
        for i in 0..10 {
            cache.insert((0, i), block(16));
        }

        let before = cache.memory_usage();
        let evicted = cache.set_memory_limit(before / 2);
        assert!(evicted > 0);
        assert!(cache.memory_usage() <= before / 2);
        assert_eq!(cache.memory_limit(), before / 2);
    }

    #[test]
    fn test_hash_path() {
        let hash1 = hash_path("s3://scenes/2020/a.tif");
        let hash2 = hash_path("s3://scenes/2020/a.tif");
        let hash3 = hash_path("s3://scenes/2021/a.tif");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }
}
