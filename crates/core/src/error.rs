//! Fetch errors surfaced by data sources

pub type FetchResult<T> = Result<T, FetchError>;

/// Errors reported by a [`crate::DataSource`]
///
/// A failed fetch is never cached or merged and is not retried by the cache.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend disconnected")]
    Disconnected,
}
