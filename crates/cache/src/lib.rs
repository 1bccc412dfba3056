//! addrscope cache library
//!
//! Bounded chunk cache with LRU eviction, plus the tunables shared by the
//! byte-window and record-window caches.

pub mod chunk;
pub mod config;

pub use chunk::{CacheStats, ChunkCache, ChunkKey};
pub use config::{CacheConfig, ConfigError};
