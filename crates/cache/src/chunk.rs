//! Chunk cache with LRU eviction
//!
//! Holds fetched address-space chunks keyed by their aligned start address.
//! The cache is bounded by entry count; when full, the least recently
//! accessed chunk (by `get` or `put`) is evicted.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Aligned start address identifying a chunk
pub type ChunkKey = u64;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of chunks currently in cache
    pub entries: usize,

    /// Maximum number of chunks the cache holds
    pub capacity: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of chunks evicted to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState<P> {
    chunks: LruCache<ChunkKey, Arc<P>>,
    stats: CacheStats,
}

impl<P> CacheState<P> {
    fn sync_len(&mut self) {
        self.stats.entries = self.chunks.len();
    }
}

/// Bounded LRU store of chunk payloads
///
/// Thread-safe: the internal lock is held only for the map operation itself,
/// never while a chunk is being fetched. Payloads are handed out as shared
/// `Arc` views; callers never mutate a cached chunk in place.
///
/// # Example
///
/// ```
/// use addrscope_cache::ChunkCache;
///
/// let cache: ChunkCache<Vec<u8>> = ChunkCache::new(2);
/// cache.put(0, vec![0u8; 4096]);
/// cache.put(4096, vec![1u8; 4096]);
///
/// // Touch chunk 0 so chunk 4096 becomes the eviction candidate
/// assert!(cache.get(0).is_some());
/// cache.put(8192, vec![2u8; 4096]);
///
/// assert!(cache.contains(0));
/// assert!(!cache.contains(4096));
/// ```
pub struct ChunkCache<P> {
    state: Mutex<CacheState<P>>,
}

impl<P> ChunkCache<P> {
    /// Create a cache holding at most `capacity` chunks
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                chunks: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..Default::default()
                },
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retrieve a chunk, marking it most recently used
    ///
    /// Returns `None` on a miss; never waits on a fetch.
    pub fn get(&self, key: ChunkKey) -> Option<Arc<P>> {
        let mut state = self.lock();

        match state.chunks.get(&key).cloned() {
            Some(chunk) => {
                state.stats.hits += 1;
                Some(chunk)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Retrieve a chunk without updating recency or statistics
    pub fn peek(&self, key: ChunkKey) -> Option<Arc<P>> {
        self.lock().chunks.peek(&key).cloned()
    }

    /// Check if a chunk is cached without updating recency
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.lock().chunks.contains(&key)
    }

    /// Store a chunk, evicting the least recently used one if full
    ///
    /// Replacing an existing key never evicts another chunk.
    pub fn put(&self, key: ChunkKey, payload: P) -> Arc<P> {
        let payload = Arc::new(payload);
        let mut state = self.lock();

        if let Some((evicted, _)) = state.chunks.push(key, Arc::clone(&payload)) {
            if evicted != key {
                state.stats.evictions += 1;
                tracing::trace!(evicted, inserted = key, "evicted least recently used chunk");
            }
        }
        state.sync_len();

        payload
    }

    /// Remove a chunk, returning it if it was cached
    pub fn remove(&self, key: ChunkKey) -> Option<Arc<P>> {
        let mut state = self.lock();
        let removed = state.chunks.pop(&key);
        state.sync_len();
        removed
    }

    /// Drop every cached chunk
    pub fn evict_all(&self) {
        let mut state = self.lock();
        state.chunks.clear();
        state.sync_len();
    }

    /// Number of chunks currently cached
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of chunks
    pub fn capacity(&self) -> usize {
        self.lock().chunks.cap().get()
    }

    /// Cached keys, most recently used first
    pub fn keys(&self) -> Vec<ChunkKey> {
        self.lock().chunks.iter().map(|(key, _)| *key).collect()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}
