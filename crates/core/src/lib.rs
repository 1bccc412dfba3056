//! addrscope Core Library
//!
//! Virtualized chunked caches over large address spaces, for raw byte
//! windows and for decoded variable-length records.

pub mod bytes;
mod chunked;
pub mod error;
pub mod indexer;
pub mod jump;
pub mod merger;
pub mod notify;
pub mod range;
pub mod record;
pub mod records;
pub mod source;

#[cfg(test)]
mod testing;

pub use addrscope_cache::{CacheConfig, CacheStats, ConfigError};
pub use addrscope_scheduler::ChunkKey;
pub use bytes::{ByteRow, ByteWindowCache};
pub use chunked::LoadOutcome;
pub use error::{FetchError, FetchResult};
pub use indexer::{ByteIndexer, RecordIndexer};
pub use jump::{JumpController, JumpTarget};
pub use merger::RecordMerger;
pub use notify::{ChunkEvent, ChunkNotifier};
pub use range::AddressRange;
pub use record::Record;
pub use records::RecordWindowCache;
pub use source::DataSource;
