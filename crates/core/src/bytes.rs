//! Raw byte window cache
//!
//! Serves fixed-width rows of raw bytes out of fixed-stride chunks. Reads
//! never fetch; loads are requested explicitly by the scrolling UI.

use crate::chunked::{ChunkedCore, LoadMode, LoadOutcome};
use crate::error::FetchResult;
use crate::indexer::ByteIndexer;
use crate::notify::ChunkEvent;
use crate::range::AddressRange;
use crate::source::DataSource;
use addrscope_cache::{CacheConfig, CacheStats};
use addrscope_scheduler::ChunkKey;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One display row of raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRow {
    pub address: u64,
    pub bytes: Vec<u8>,
}

struct Inner {
    range: AddressRange,
    config: CacheConfig,
    indexer: ByteIndexer,
    core: ChunkedCore<Vec<u8>, ()>,
    source: Arc<dyn DataSource>,
}

/// Byte-window cache for one address-space session
///
/// Cloning is cheap and every clone shares the same cache, so a clone can be
/// moved into a spawned load task.
///
/// # Example
///
/// ```no_run
/// use addrscope_core::{AddressRange, ByteWindowCache, CacheConfig, DataSource};
/// use std::sync::Arc;
///
/// # async fn demo(source: Arc<dyn DataSource>) -> Result<(), addrscope_core::FetchError> {
/// let cache = ByteWindowCache::new(AddressRange::new(0, 1 << 20), CacheConfig::default(), source);
///
/// cache.load_chunk_around_address(5000).await?;
/// if let Some(row) = cache.row_at_address(5000) {
///     println!("{:#x}: {:02x?}", row.address, row.bytes);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ByteWindowCache {
    inner: Arc<Inner>,
}

impl ByteWindowCache {
    pub fn new(range: AddressRange, config: CacheConfig, source: Arc<dyn DataSource>) -> Self {
        let window = range.chunks(u64::from(config.byte_chunk_size));
        let core = ChunkedCore::new(window, config.chunk_capacity, ());
        let indexer = ByteIndexer::new(range, config.row_width);
        Self {
            inner: Arc::new(Inner {
                range,
                config,
                indexer,
                core,
                source,
            }),
        }
    }

    pub fn range(&self) -> AddressRange {
        self.inner.range
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    async fn fetch_chunk(&self, key: ChunkKey) -> FetchResult<Vec<u8>> {
        let span = self.inner.core.window().span_len(key);
        let length = u32::try_from(span).unwrap_or(u32::MAX);
        let mut bytes = self.inner.source.fetch_bytes(key, length).await?;
        bytes.truncate(span as usize);
        Ok(bytes)
    }

    async fn load_key(&self, key: ChunkKey, mode: LoadMode) -> FetchResult<LoadOutcome> {
        self.inner
            .core
            .load(key, mode, |key| self.fetch_chunk(key))
            .await
    }

    /// Make sure the chunk owning `address` is cached
    ///
    /// Addresses past the end load the last chunk.
    pub async fn load_chunk_around_address(&self, address: u64) -> FetchResult<LoadOutcome> {
        if self.inner.range.is_empty() {
            return Ok(LoadOutcome::OutOfRange);
        }
        let key = self.inner.core.window().key_for(address);
        self.load_key(key, LoadMode::Coalesce).await
    }

    /// Load up to `range_chunks` chunks on either side of `address`
    ///
    /// Best-effort: failures are logged by the load and not returned.
    /// Returns how many chunks this call fetched and stored.
    pub async fn preload_around(&self, address: u64, range_chunks: u32) -> usize {
        let keys = self.inner.core.window().keys_around(address, range_chunks);
        let loads = keys.into_iter().map(|key| self.load_key(key, LoadMode::Coalesce));

        join_all(loads)
            .await
            .into_iter()
            .filter(|outcome| matches!(outcome, Ok(LoadOutcome::Loaded)))
            .count()
    }

    /// Preload with the configured margin
    pub async fn preload_default(&self, address: u64) -> usize {
        self.preload_around(address, self.inner.config.preload_chunks).await
    }

    /// Row of up to `row_width` bytes starting at `address`
    ///
    /// Truncated at the end of the owning chunk. `None` if the chunk is not
    /// cached or `address` is outside the range.
    pub fn row_at_address(&self, address: u64) -> Option<ByteRow> {
        if !self.inner.range.contains(address) {
            return None;
        }
        let key = self.inner.core.window().key_for(address);
        let chunk = self.inner.core.cache().get(key)?;

        let offset = (address - key) as usize;
        if offset >= chunk.len() {
            return None;
        }
        let end = offset
            .saturating_add(self.inner.indexer.row_width() as usize)
            .min(chunk.len());

        Some(ByteRow {
            address,
            bytes: chunk[offset..end].to_vec(),
        })
    }

    /// Row at scroll position `index`
    pub fn get_by_index(&self, index: u64) -> Option<ByteRow> {
        if index >= self.row_count() {
            return None;
        }
        self.row_at_address(self.inner.indexer.address_for_index(index))
    }

    /// Drop the chunk owning `address` and fetch it again
    ///
    /// Waits for any fetch of that chunk already running, so data read after
    /// this returns reflects the backend at or after the call.
    pub async fn invalidate_and_reload(&self, address: u64) -> FetchResult<LoadOutcome> {
        if self.inner.range.is_empty() {
            return Ok(LoadOutcome::OutOfRange);
        }
        let key = self.inner.core.window().key_for(address);
        self.inner.core.invalidate(key);
        self.load_key(key, LoadMode::Fresh).await
    }

    /// Drop everything, then load the chunk owning `address`
    pub async fn reset_and_load_around(&self, address: u64) -> FetchResult<LoadOutcome> {
        self.reset();
        if self.inner.range.is_empty() {
            return Ok(LoadOutcome::OutOfRange);
        }
        let key = self.inner.core.window().key_for(address);
        self.load_key(key, LoadMode::Fresh).await
    }

    /// Drop every cached chunk
    ///
    /// Fetches still running are discarded when they complete.
    pub fn reset(&self) {
        self.inner.core.reset();
    }

    pub fn clear_cache(&self) {
        self.reset();
    }

    pub fn row_count(&self) -> u64 {
        self.inner.indexer.row_count()
    }

    pub fn estimated_total_count(&self) -> u64 {
        self.row_count()
    }

    pub fn index_for_address(&self, address: u64) -> u64 {
        self.inner.indexer.index_for_address(address)
    }

    pub fn address_for_index(&self, index: u64) -> u64 {
        self.inner.indexer.address_for_index(index)
    }

    pub fn is_cached(&self, address: u64) -> bool {
        let key = self.inner.core.window().key_for(address);
        self.inner.core.cache().contains(key)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.inner.core.notifier().subscribe()
    }

    /// Call `callback` with the key of every chunk that finishes loading
    pub fn on_chunk_loaded<F>(&self, callback: F)
    where
        F: Fn(ChunkKey) + Send + Sync + 'static,
    {
        self.inner.core.notifier().on_event(move |event| {
            if let ChunkEvent::Loaded(key) = event {
                callback(key);
            }
        });
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.core.cache().stats()
    }

    /// Number of chunk fetches currently running
    pub fn in_flight(&self) -> usize {
        self.inner.core.coordinator().in_flight()
    }
}

impl std::fmt::Debug for ByteWindowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteWindowCache")
            .field("range", &self.inner.range)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
