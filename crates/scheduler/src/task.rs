//! Replaceable cancellable task slot
//!
//! A slot owns at most one running task. Starting a new task aborts the
//! previous one without waiting for it, which keeps rapid scrollbar drags
//! responsive: only the latest jump does any work.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};

/// Slot holding the latest spawned task
///
/// Aborting a task drops its future at the next suspension point, so any
/// RAII guards it holds (such as a [`crate::LoadGuard`]) are released.
///
/// # Example
///
/// ```
/// use addrscope_scheduler::TaskSlot;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let slot = TaskSlot::new();
///
/// let first = slot.replace(std::future::pending::<()>());
/// let second = slot.replace(async { 42 });
///
/// assert!(first.await.unwrap_err().is_cancelled());
/// assert_eq!(second.await.unwrap(), 42);
/// # }
/// ```
#[derive(Default)]
pub struct TaskSlot {
    current: Mutex<Option<AbortHandle>>,
    generation: AtomicU64,
}

impl TaskSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `future`, aborting whatever task the slot held before
    ///
    /// Must be called from within a Tokio runtime.
    pub fn replace<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let previous = self.lock().replace(handle.abort_handle());
        if let Some(previous) = previous {
            if !previous.is_finished() {
                tracing::debug!(generation, "aborting superseded task");
            }
            previous.abort();
        }

        handle
    }

    /// Abort the current task, if any
    ///
    /// Returns `true` if a still-running task was aborted.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    /// Check whether the latest task is still running
    pub fn is_active(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Number of tasks started through this slot
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }
}
