//! In-flight fetch coalescing
//!
//! The coordinator tracks which chunk keys are currently being fetched so
//! that at most one fetch per key is outstanding. Winning `try_begin`
//! returns a [`LoadGuard`]; dropping the guard releases the key, which also
//! happens when the owning task is aborted mid-fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Aligned start address identifying a chunk
pub type ChunkKey = u64;

type LoadingSet = Arc<Mutex<HashMap<ChunkKey, Arc<Notify>>>>;

fn lock(set: &LoadingSet) -> MutexGuard<'_, HashMap<ChunkKey, Arc<Notify>>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deduplicates concurrent fetches of the same chunk
///
/// The lock is held only for the membership test-and-set, never while the
/// fetch runs, so a slow chunk never blocks requests for other chunks.
///
/// Losing callers must not wait and must not retry on their own: data is
/// not guaranteed to be present when a coalesced call returns. They rely on
/// the winner's load notification, or poll again later.
///
/// # Example
///
/// ```
/// use addrscope_scheduler::LoadCoordinator;
///
/// let coordinator = LoadCoordinator::new();
///
/// let guard = coordinator.try_begin(4096).expect("first caller wins");
/// assert!(coordinator.try_begin(4096).is_none());
///
/// drop(guard);
/// assert!(coordinator.try_begin(4096).is_some());
/// ```
#[derive(Clone, Default)]
pub struct LoadCoordinator {
    loading: LoadingSet,
}

impl LoadCoordinator {
    /// Create a coordinator with an empty loading set
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `key` for fetching
    ///
    /// Returns `None` if another caller already owns the fetch.
    pub fn try_begin(&self, key: ChunkKey) -> Option<LoadGuard> {
        let mut loading = lock(&self.loading);
        if loading.contains_key(&key) {
            tracing::trace!(key, "fetch already in flight");
            return None;
        }
        loading.insert(key, Arc::new(Notify::new()));
        Some(LoadGuard {
            key,
            loading: Arc::clone(&self.loading),
        })
    }

    /// Release a claimed key
    ///
    /// Equivalent to dropping the guard.
    pub fn end(&self, guard: LoadGuard) {
        drop(guard);
    }

    /// Check whether `key` is currently being fetched
    pub fn is_loading(&self, key: ChunkKey) -> bool {
        lock(&self.loading).contains_key(&key)
    }

    /// Number of fetches currently in flight
    pub fn in_flight(&self) -> usize {
        lock(&self.loading).len()
    }

    /// Wait until `key` is no longer in flight
    ///
    /// Returns immediately if nobody owns the key. Another caller may claim
    /// the key again right after this returns.
    pub async fn wait_idle(&self, key: ChunkKey) {
        let notify = match lock(&self.loading).get(&key) {
            Some(notify) => Arc::clone(notify),
            None => return,
        };

        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // The owner may have finished before we registered
        let still_owned = lock(&self.loading)
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &notify));
        if still_owned {
            notified.await;
        }
    }
}

/// Ownership of one in-flight fetch
///
/// The key is released when the guard is dropped: on success, on error,
/// on panic, or when the future holding it is cancelled.
#[must_use = "dropping the guard immediately releases the chunk key"]
pub struct LoadGuard {
    key: ChunkKey,
    loading: LoadingSet,
}

impl LoadGuard {
    /// The claimed chunk key
    pub fn key(&self) -> ChunkKey {
        self.key
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let notify = lock(&self.loading).remove(&self.key);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

impl std::fmt::Debug for LoadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadGuard").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_begin_basic() {
        let coordinator = LoadCoordinator::new();

        let guard = coordinator.try_begin(1).expect("should win");
        assert_eq!(guard.key(), 1);
        assert!(coordinator.is_loading(1));
        assert_eq!(coordinator.in_flight(), 1);
    }

    #[test]
    fn test_second_caller_loses() {
        let coordinator = LoadCoordinator::new();

        let _guard = coordinator.try_begin(1).unwrap();
        assert!(coordinator.try_begin(1).is_none());

        // Other keys are unaffected
        assert!(coordinator.try_begin(2).is_some());
    }

    #[test]
    fn test_end_releases_key() {
        let coordinator = LoadCoordinator::new();

        let guard = coordinator.try_begin(1).unwrap();
        coordinator.end(guard);

        assert!(!coordinator.is_loading(1));
        assert!(coordinator.try_begin(1).is_some());
    }

    #[test]
    fn test_clones_share_loading_set() {
        let coordinator = LoadCoordinator::new();
        let other = coordinator.clone();

        let _guard = coordinator.try_begin(7).unwrap();
        assert!(other.try_begin(7).is_none());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let coordinator = LoadCoordinator::new();
        let inner = coordinator.clone();

        let result = std::panic::catch_unwind(move || {
            let _guard = inner.try_begin(3).unwrap();
            panic!("fetch blew up");
        });

        assert!(result.is_err());
        assert!(!coordinator.is_loading(3));
    }

    #[test]
    fn test_concurrent_try_begin_single_winner() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Barrier;
        use std::thread;

        let coordinator = LoadCoordinator::new();
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = vec![];

        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let winners = Arc::clone(&winners);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let guard = coordinator.try_begin(42);
                if guard.is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                // Hold the claim until every thread has tried
                barrier.wait();
                drop(guard);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_when_not_loading() {
        let coordinator = LoadCoordinator::new();
        coordinator.wait_idle(5).await;
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_on_release() {
        let coordinator = LoadCoordinator::new();
        let guard = coordinator.try_begin(5).unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_idle(5).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_aborted_task_releases_key() {
        let coordinator = LoadCoordinator::new();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let _guard = coordinator.try_begin(9).unwrap();
                let _ = started_tx.send(());
                std::future::pending::<()>().await;
            })
        };

        started_rx.await.unwrap();
        assert!(coordinator.is_loading(9));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(coordinator.try_begin(9).is_some());
    }
}
