//! File-backed data source

use addrscope_core::{DataSource, FetchError, Record};
use async_trait::async_trait;
use std::path::Path;

/// Serves a file's bytes as an address space starting at `base`
///
/// Records are fixed-width slices rendered as hex; a trailing partial
/// record is not produced.
pub struct FileSource {
    base: u64,
    record_size: u32,
    data: Vec<u8>,
}

impl FileSource {
    pub fn open(path: &Path, base: u64, record_size: u32) -> std::io::Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?, base, record_size))
    }

    pub fn from_bytes(data: Vec<u8>, base: u64, record_size: u32) -> Self {
        Self {
            base,
            record_size: record_size.max(1),
            data,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn slice(&self, address: u64, length: u64) -> &[u8] {
        let Some(offset) = address.checked_sub(self.base) else {
            return &[];
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.data.len());
        let end = usize::try_from(offset.saturating_add(length))
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        &self.data[start..end]
    }
}

#[async_trait]
impl DataSource for FileSource {
    async fn fetch_bytes(&self, address: u64, length: u32) -> Result<Vec<u8>, FetchError> {
        tracing::trace!(address, length, "reading bytes");
        Ok(self.slice(address, u64::from(length)).to_vec())
    }

    async fn fetch_records(&self, address: u64, count: u32) -> Result<Vec<Record>, FetchError> {
        tracing::trace!(address, count, "reading records");
        let size = u64::from(self.record_size);
        let mut records = Vec::new();

        for i in 0..u64::from(count) {
            let at = address.saturating_add(i * size);
            let bytes = self.slice(at, size);
            if bytes.len() as u64 != size {
                break;
            }
            records.push(Record::new(at, self.record_size, bytes.to_vec(), hex::encode(bytes)));
        }

        Ok(records)
    }
}
