//! addrscope scheduler library
//!
//! Fetch coordination primitives for the chunked address-space caches.
//!
//! This crate keeps the number of backend round-trips down: concurrent
//! requests for the same chunk are coalesced into one fetch, preloads are
//! planned nearest-first around the viewed chunk, and jump tasks are
//! replaced (and aborted) as the user drags the scrollbar.
//!
//! # Example
//!
//! ```
//! use addrscope_scheduler::{ChunkWindow, LoadCoordinator};
//!
//! let window = ChunkWindow::new(0, 1 << 20, 4096);
//! let coordinator = LoadCoordinator::new();
//!
//! for key in window.keys_around(5000, 1) {
//!     if let Some(guard) = coordinator.try_begin(key) {
//!         // ... fetch the chunk, then release the key ...
//!         drop(guard);
//!     }
//! }
//! ```

mod coordinator;
mod task;
mod window;

// Re-export public API
pub use coordinator::{ChunkKey, LoadCoordinator, LoadGuard};
pub use task::TaskSlot;
pub use window::ChunkWindow;
