//! Generic chunk load pipeline shared by the byte and record caches
//!
//! A load claims the chunk key, fetches outside every lock, and then commits
//! under the commit lock. The commit lock also carries the reset epoch: a
//! fetch that started before a reset is dropped instead of repopulating the
//! freshly cleared cache.

use crate::error::FetchResult;
use crate::notify::{ChunkEvent, ChunkNotifier};
use addrscope_cache::ChunkCache;
use addrscope_scheduler::{ChunkKey, ChunkWindow, LoadCoordinator, LoadGuard};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Payload stored per chunk
pub(crate) trait ChunkPayload: Send + Sync + 'static {
    /// Whether the fetch produced nothing worth caching
    fn is_empty(&self) -> bool;
}

impl<T: Send + Sync + 'static> ChunkPayload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

/// Side store kept in step with the chunk cache
///
/// Hooks run under the commit lock and must not block. Dropping a chunk
/// from the cache never reaches the sink.
pub(crate) trait ChunkSink<P>: Send + Sync {
    fn commit(&self, _key: ChunkKey, _payload: &P, _mode: LoadMode) {}

    fn clear(&self) {}
}

impl<P> ChunkSink<P> for () {}

/// Result of a load request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The chunk was already cached; nothing was fetched
    Cached,
    /// This call fetched and stored the chunk
    Loaded,
    /// Another caller is already fetching the chunk
    ///
    /// The call does not wait for that fetch, so the data may not be present
    /// yet. Re-read after the next [`ChunkEvent::Loaded`].
    Coalesced,
    /// The backend returned no data; nothing was stored
    Empty,
    /// The cache was reset while the fetch was running; the result was
    /// dropped
    Discarded,
    /// The request lies outside the address range
    OutOfRange,
}

impl LoadOutcome {
    /// Whether this call stored new data
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded)
    }
}

/// How a load treats an existing chunk or an in-flight fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadMode {
    /// Reuse the cached chunk, or return immediately if a fetch is running
    Coalesce,
    /// Wait out any running fetch, drop the cached chunk, fetch again
    Fresh,
}

pub(crate) struct ChunkedCore<P, S> {
    window: ChunkWindow,
    cache: ChunkCache<P>,
    coordinator: LoadCoordinator,
    notifier: ChunkNotifier,
    sink: S,
    epoch: Mutex<u64>,
}

impl<P, S> ChunkedCore<P, S>
where
    P: ChunkPayload,
    S: ChunkSink<P>,
{
    pub fn new(window: ChunkWindow, capacity: usize, sink: S) -> Self {
        Self {
            window,
            cache: ChunkCache::new(capacity),
            coordinator: LoadCoordinator::new(),
            notifier: ChunkNotifier::new(),
            sink,
            epoch: Mutex::new(0),
        }
    }

    pub fn window(&self) -> &ChunkWindow {
        &self.window
    }

    pub fn cache(&self) -> &ChunkCache<P> {
        &self.cache
    }

    pub fn coordinator(&self) -> &LoadCoordinator {
        &self.coordinator
    }

    pub fn notifier(&self) -> &ChunkNotifier {
        &self.notifier
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the chunk at `key` with `fetch`
    ///
    /// The key is released on every exit path, including cancellation of
    /// the calling task while `fetch` is pending.
    pub async fn load<F, Fut>(&self, key: ChunkKey, mode: LoadMode, fetch: F) -> FetchResult<LoadOutcome>
    where
        F: FnOnce(ChunkKey) -> Fut,
        Fut: Future<Output = FetchResult<P>>,
    {
        let guard = match mode {
            LoadMode::Coalesce => {
                if self.cache.contains(key) {
                    return Ok(LoadOutcome::Cached);
                }
                let Some(guard) = self.coordinator.try_begin(key) else {
                    return Ok(LoadOutcome::Coalesced);
                };
                // A winner may have committed between the check and the claim
                if self.cache.contains(key) {
                    return Ok(LoadOutcome::Cached);
                }
                guard
            }
            LoadMode::Fresh => {
                let guard = self.claim_waiting(key).await;
                self.cache.remove(key);
                guard
            }
        };

        let epoch = *self.lock_epoch();
        tracing::debug!(key, ?mode, "fetching chunk");

        let payload = match fetch(key).await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(key, %error, "chunk fetch failed");
                return Err(error);
            }
        };

        if payload.is_empty() {
            tracing::debug!(key, "backend returned no data");
            return Ok(LoadOutcome::Empty);
        }

        {
            let current = self.lock_epoch();
            if *current != epoch {
                tracing::debug!(key, "dropping fetch that started before a reset");
                return Ok(LoadOutcome::Discarded);
            }
            self.sink.commit(key, &payload, mode);
            self.cache.put(key, payload);
        }

        drop(guard);
        self.notifier.emit(ChunkEvent::Loaded(key));
        Ok(LoadOutcome::Loaded)
    }

    async fn claim_waiting(&self, key: ChunkKey) -> LoadGuard {
        loop {
            if let Some(guard) = self.coordinator.try_begin(key) {
                return guard;
            }
            self.coordinator.wait_idle(key).await;
        }
    }

    /// Drop the chunk at `key` ahead of a fresh load
    pub fn invalidate(&self, key: ChunkKey) -> bool {
        let removed = self.cache.remove(key).is_some();
        tracing::debug!(key, removed, "invalidated chunk");
        self.notifier.emit(ChunkEvent::Invalidated(key));
        removed
    }

    /// Keys of cached chunks whose payload satisfies `predicate`
    pub fn cached_keys_where(&self, predicate: impl Fn(&P) -> bool) -> Vec<ChunkKey> {
        self.cache
            .keys()
            .into_iter()
            .filter(|key| self.cache.peek(*key).is_some_and(|payload| predicate(&*payload)))
            .collect()
    }

    /// Discard all cached state and every fetch still in flight
    pub fn reset(&self) {
        {
            let mut epoch = self.lock_epoch();
            *epoch += 1;
            self.cache.evict_all();
            self.sink.clear();
            tracing::debug!(epoch = *epoch, "cache reset");
        }
        self.notifier.emit(ChunkEvent::Reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CountingSink {
        commits: AtomicUsize,
        fresh_commits: AtomicUsize,
        clears: AtomicUsize,
    }

    impl ChunkSink<Vec<u8>> for CountingSink {
        fn commit(&self, _key: ChunkKey, _payload: &Vec<u8>, mode: LoadMode) {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if mode == LoadMode::Fresh {
                self.fresh_commits.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ready(bytes: Vec<u8>) -> std::future::Ready<FetchResult<Vec<u8>>> {
        std::future::ready(Ok(bytes))
    }

    fn new_core() -> ChunkedCore<Vec<u8>, CountingSink> {
        ChunkedCore::new(ChunkWindow::new(0, 1 << 16, 4096), 8, CountingSink::default())
    }

    #[tokio::test]
    async fn test_load_then_cached() {
        let core = new_core();

        let outcome = core
            .load(4096, LoadMode::Coalesce, |_| ready(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(core.sink().commits.load(Ordering::SeqCst), 1);

        let outcome = core
            .load(4096, LoadMode::Coalesce, |_| ready(vec![9]))
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Cached);
        assert_eq!(*core.cache().peek(4096).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fresh_load_replaces_chunk() {
        let core = new_core();
        core.load(0, LoadMode::Coalesce, |_| ready(vec![1]))
            .await
            .unwrap();

        let outcome = core
            .load(0, LoadMode::Fresh, |_| ready(vec![2]))
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(*core.cache().peek(0).unwrap(), vec![2]);
        assert_eq!(core.sink().commits.load(Ordering::SeqCst), 2);
        assert_eq!(core.sink().fresh_commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_not_cached() {
        let core = new_core();

        let outcome = core
            .load(0, LoadMode::Coalesce, |_| ready(Vec::new()))
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Empty);
        assert!(!core.cache().contains(0));
        assert_eq!(core.coordinator().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_releases_key() {
        let core = new_core();

        let result = core
            .load(0, LoadMode::Coalesce, |_| async {
                Err::<Vec<u8>, _>(FetchError::Backend("boom".to_string()))
            })
            .await;

        assert!(matches!(result, Err(FetchError::Backend(_))));
        assert!(!core.cache().contains(0));
        assert!(core.coordinator().try_begin(0).is_some());
    }

    #[tokio::test]
    async fn test_loser_returns_coalesced_without_waiting() {
        let core = Arc::new(new_core());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let winner = {
            let core = Arc::clone(&core);
            tokio::spawn(async move {
                core.load(0, LoadMode::Coalesce, |_| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, FetchError>(vec![7u8])
                })
                .await
            })
        };

        started_rx.await.unwrap();
        let outcome = core
            .load(0, LoadMode::Coalesce, |_| ready(vec![8]))
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Coalesced);

        release_tx.send(()).unwrap();
        assert_eq!(winner.await.unwrap().unwrap(), LoadOutcome::Loaded);
        assert_eq!(*core.cache().peek(0).unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_fetch_straddling_reset_is_discarded() {
        let core = Arc::new(new_core());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let task = {
            let core = Arc::clone(&core);
            tokio::spawn(async move {
                core.load(0, LoadMode::Coalesce, |_| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, FetchError>(vec![1u8])
                })
                .await
            })
        };

        started_rx.await.unwrap();
        core.reset();
        release_tx.send(()).unwrap();

        assert_eq!(task.await.unwrap().unwrap(), LoadOutcome::Discarded);
        assert!(core.cache().is_empty());
        assert_eq!(core.sink().clears.load(Ordering::SeqCst), 1);
        assert_eq!(core.sink().commits.load(Ordering::SeqCst), 0);
        assert_eq!(core.coordinator().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_emits_event() {
        let core = new_core();
        let mut events = core.notifier().subscribe();

        core.load(0, LoadMode::Coalesce, |_| ready(vec![1]))
            .await
            .unwrap();
        assert!(core.invalidate(0));
        assert!(!core.invalidate(0));

        assert_eq!(events.try_recv().unwrap(), ChunkEvent::Loaded(0));
        assert_eq!(events.try_recv().unwrap(), ChunkEvent::Invalidated(0));
    }

    #[tokio::test]
    async fn test_cached_keys_where() {
        let core = new_core();
        for key in [0u64, 4096, 8192] {
            core.load(key, LoadMode::Coalesce, move |_| ready(vec![(key / 4096) as u8; 2]))
                .await
                .unwrap();
        }

        let mut keys = core.cached_keys_where(|payload| payload[0] != 0);
        keys.sort_unstable();
        assert_eq!(keys, vec![4096, 8192]);
    }
}
