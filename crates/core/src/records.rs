//! Decoded record window cache
//!
//! Record chunks are fetched by count from an estimated address stride and
//! folded into one canonical store. The UI indexes the store, not the chunk
//! cache, so evicting a chunk from the LRU does not shrink what is shown.

use crate::chunked::{ChunkSink, ChunkedCore, LoadMode, LoadOutcome};
use crate::error::FetchResult;
use crate::indexer::RecordIndexer;
use crate::merger::RecordMerger;
use crate::notify::ChunkEvent;
use crate::range::AddressRange;
use crate::record::Record;
use crate::source::DataSource;
use addrscope_cache::{CacheConfig, CacheStats};
use addrscope_scheduler::ChunkKey;
use futures_util::future::join_all;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Address span `[first address, furthest end)` of a record batch
fn span_of(records: &[Record]) -> Option<(u64, u64)> {
    let start = records.iter().map(|r| r.address).min()?;
    let end = records.iter().map(Record::end).max()?;
    Some((start, end))
}

#[derive(Default)]
struct RecordStore {
    merger: RwLock<RecordMerger>,
}

impl RecordStore {
    fn read(&self) -> RwLockReadGuard<'_, RecordMerger> {
        self.merger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RecordMerger> {
        self.merger.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChunkSink<Vec<Record>> for RecordStore {
    /// A fresh batch replaces every stored record overlapping its span
    fn commit(&self, key: ChunkKey, payload: &Vec<Record>, mode: LoadMode) {
        let mut store = self.write();
        if mode == LoadMode::Fresh {
            if let Some((start, end)) = span_of(payload) {
                let replaced = store.remove_span(start, end);
                tracing::trace!(key, replaced, "replacing records under fresh chunk");
            }
        }
        store.merge(payload.iter().cloned());
    }

    fn clear(&self) {
        self.write().clear();
    }
}

struct Inner {
    range: AddressRange,
    config: CacheConfig,
    core: ChunkedCore<Vec<Record>, RecordStore>,
    source: Arc<dyn DataSource>,
}

/// Record-window cache for one address-space session
///
/// Cloning shares the cache.
#[derive(Clone)]
pub struct RecordWindowCache {
    inner: Arc<Inner>,
}

impl RecordWindowCache {
    pub fn new(range: AddressRange, config: CacheConfig, source: Arc<dyn DataSource>) -> Self {
        let window = range.chunks(config.record_stride());
        let core = ChunkedCore::new(window, config.chunk_capacity, RecordStore::default());
        Self {
            inner: Arc::new(Inner {
                range,
                config,
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

    fn store(&self) -> RwLockReadGuard<'_, RecordMerger> {
        self.inner.core.sink().read()
    }

    async fn fetch_chunk(&self, key: ChunkKey) -> FetchResult<Vec<Record>> {
        let count = self.inner.config.records_per_chunk.max(1);
        let mut records = self.inner.source.fetch_records(key, count).await?;
        records.retain(|record| self.inner.range.contains(record.address));
        records.sort_by_key(|record| record.address);
        Ok(records)
    }

    async fn load_key(&self, key: ChunkKey, mode: LoadMode) -> FetchResult<LoadOutcome> {
        self.inner
            .core
            .load(key, mode, |key| self.fetch_chunk(key))
            .await
    }

    /// Make sure the chunk owning `address` is cached and merged
    pub async fn load_chunk_around_address(&self, address: u64) -> FetchResult<LoadOutcome> {
        if self.inner.range.is_empty() {
            return Ok(LoadOutcome::OutOfRange);
        }
        let key = self.inner.core.window().key_for(address);
        self.load_key(key, LoadMode::Coalesce).await
    }

    /// Extend the loaded records at one edge
    ///
    /// Forward continues right after the last loaded record; on an empty
    /// store it loads the range start. Backward steps one stride before the
    /// first loaded record and does nothing on an empty store.
    pub async fn load_more(&self, forward: bool) -> FetchResult<LoadOutcome> {
        let start = self.inner.range.start();
        let next = {
            let store = self.store();
            if forward {
                store.last().map_or(start, Record::end)
            } else {
                match store.first() {
                    Some(first) if first.address > start => first
                        .address
                        .saturating_sub(self.inner.core.window().stride())
                        .max(start),
                    _ => return Ok(LoadOutcome::OutOfRange),
                }
            }
        };

        if next >= self.inner.range.end() {
            return Ok(LoadOutcome::OutOfRange);
        }
        tracing::debug!(next, forward, "extending loaded records");
        self.load_key(next, LoadMode::Coalesce).await
    }

    /// Load up to `range_chunks` chunks on each side of `address`, nearest first
    ///
    /// Best-effort: failures are logged by the load and not returned.
    /// Returns how many chunks this call fetched and merged.
    pub async fn preload_around(&self, address: u64, range_chunks: u32) -> usize {
        if self.inner.range.is_empty() {
            return 0;
        }
        let keys = self.inner.core.window().keys_around(address, range_chunks);
        let loads = keys.into_iter().map(|key| self.load_key(key, LoadMode::Coalesce));

        join_all(loads)
            .await
            .into_iter()
            .filter(|outcome| matches!(outcome, Ok(LoadOutcome::Loaded)))
            .count()
    }

    pub async fn preload_default(&self, address: u64) -> usize {
        self.preload_around(address, self.inner.config.preload_chunks).await
    }

    /// Record at scroll position `index` of the canonical store
    pub fn get_by_index(&self, index: u64) -> Option<Record> {
        let index = usize::try_from(index).ok()?;
        self.store().get(index).cloned()
    }

    /// Loaded record whose bytes cover `address`
    pub fn row_at_address(&self, address: u64) -> Option<Record> {
        self.store().containing(address).cloned()
    }

    /// Refetch the records around `address` after a write
    ///
    /// Every cached chunk covering `address` is dropped from the chunk
    /// cache, then the owning chunk is loaded fresh and its batch replaces
    /// the stored records it overlaps. Records outside that batch are kept.
    /// If the load does not reach `address`, a second load starts exactly
    /// there.
    pub async fn invalidate_and_reload(&self, address: u64) -> FetchResult<LoadOutcome> {
        if self.inner.range.is_empty() {
            return Ok(LoadOutcome::OutOfRange);
        }
        let window = *self.inner.core.window();
        let target = window.clamp(address);
        let key = window.key_for(target);

        let mut stale = self.inner.core.cached_keys_where(|records| {
            span_of(records).is_some_and(|(start, end)| target >= start && target < end)
        });
        if !stale.contains(&key) {
            stale.push(key);
        }
        for stale_key in stale {
            self.inner.core.invalidate(stale_key);
        }

        let outcome = self.load_key(key, LoadMode::Fresh).await?;
        if self.store().containing(target).is_some() {
            return Ok(outcome);
        }
        self.load_key(target, LoadMode::Fresh).await
    }

    /// Drop everything, then load a window of context ending at `address`
    ///
    /// Loading starts `context_records` average records before the target
    /// so the target is not pinned to the top of the list.
    pub async fn reset_and_load_around(&self, address: u64) -> FetchResult<LoadOutcome> {
        self.reset();
        if self.inner.range.is_empty() {
            return Ok(LoadOutcome::OutOfRange);
        }

        let target = self.inner.core.window().clamp(address);
        let context =
            u64::from(self.inner.config.context_records) * u64::from(self.inner.config.avg_record_size);
        let seek = target.saturating_sub(context).max(self.inner.range.start());

        let outcome = self.load_key(seek, LoadMode::Fresh).await?;
        if seek == target || self.store().containing(target).is_some() {
            return Ok(outcome);
        }

        tracing::debug!(target, seek, "context window missed target");
        self.load_key(target, LoadMode::Fresh).await
    }

    /// Drop every cached chunk and merged record
    pub fn reset(&self) {
        self.inner.core.reset();
    }

    pub fn clear_cache(&self) {
        self.reset();
    }

    fn with_indexer<T>(&self, f: impl FnOnce(&RecordIndexer<'_>) -> T) -> T {
        let store = self.store();
        let indexer = RecordIndexer::new(self.inner.range, self.inner.config.avg_record_size, store.records());
        f(&indexer)
    }

    pub fn estimated_total_count(&self) -> u64 {
        self.with_indexer(|indexer| indexer.estimated_total_count())
    }

    pub fn index_for_address(&self, address: u64) -> u64 {
        self.with_indexer(|indexer| indexer.index_for_address(address))
    }

    pub fn address_for_index(&self, index: u64) -> u64 {
        self.with_indexer(|indexer| indexer.address_for_index(index))
    }

    pub fn closest_index(&self, address: u64) -> Option<usize> {
        self.with_indexer(|indexer| indexer.closest_index(address))
    }

    /// Snapshot of the canonical store
    pub fn records(&self) -> Vec<Record> {
        self.store().records().to_vec()
    }

    pub fn loaded_count(&self) -> usize {
        self.store().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.inner.core.notifier().subscribe()
    }

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

    pub fn in_flight(&self) -> usize {
        self.inner.core.coordinator().in_flight()
    }
}

impl std::fmt::Debug for RecordWindowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWindowCache")
            .field("range", &self.inner.range)
            .field("loaded", &self.loaded_count())
            .finish_non_exhaustive()
    }
}
