//! Backend data source seam

use crate::error::FetchError;
use crate::record::Record;
use async_trait::async_trait;

/// Expensive external backend the caches fetch from
///
/// Implementations are shared across concurrent loads. Each call may be a
/// full process round trip, so the caches call them at most once per chunk
/// in flight.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Read up to `length` raw bytes starting at `address`
    ///
    /// A shorter result is valid near the end of the backing data.
    async fn fetch_bytes(&self, address: u64, length: u32) -> Result<Vec<u8>, FetchError>;

    /// Decode up to `count` records starting at `address`
    async fn fetch_records(&self, address: u64, count: u32) -> Result<Vec<Record>, FetchError>;
}
