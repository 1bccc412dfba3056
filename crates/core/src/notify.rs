//! Chunk availability notifications
//!
//! Delivery is best-effort: broadcast receivers that lag lose events, and a
//! UI is expected to re-read on any event rather than track them exactly.

use addrscope_scheduler::ChunkKey;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Change in what a cache holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEvent {
    /// A chunk was fetched and stored
    Loaded(ChunkKey),
    /// A chunk was dropped ahead of a fresh load
    Invalidated(ChunkKey),
    /// All cached state was discarded
    Reset,
}

impl ChunkEvent {
    pub fn key(&self) -> Option<ChunkKey> {
        match self {
            ChunkEvent::Loaded(key) | ChunkEvent::Invalidated(key) => Some(*key),
            ChunkEvent::Reset => None,
        }
    }
}

type Observer = Arc<dyn Fn(ChunkEvent) + Send + Sync>;

/// Fans events out to channel subscribers and registered callbacks
pub struct ChunkNotifier {
    sender: broadcast::Sender<ChunkEvent>,
    observers: RwLock<Vec<Observer>>,
}

impl ChunkNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.sender.subscribe()
    }

    /// Register a callback invoked for every event
    ///
    /// Callbacks run on the task that completed the load and must not block.
    pub fn on_event<F>(&self, observer: F)
    where
        F: Fn(ChunkEvent) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub fn emit(&self, event: ChunkEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);

        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(event);
        }
    }
}

impl Default for ChunkNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChunkNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkNotifier")
            .field("receivers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}
