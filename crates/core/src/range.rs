//! Virtual address domain

use addrscope_scheduler::ChunkWindow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open address domain `[start, end)` a cache scrolls across
///
/// Fixed for the lifetime of one cache instance; a new session builds a new
/// cache with a new range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    start: u64,
    end: u64,
}

impl AddressRange {
    /// Create a range, swapping reversed bounds
    pub fn new(start: u64, end: u64) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Range covering `len` bytes from `start`, saturating at `u64::MAX`
    pub fn with_len(start: u64, len: u64) -> Self {
        Self::new(start, start.saturating_add(len))
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    /// Clamp into `[start, end]`
    pub fn clamp(&self, address: u64) -> u64 {
        address.clamp(self.start, self.end)
    }

    /// Chunk grid over this range with the given stride
    pub fn chunks(&self, stride: u64) -> ChunkWindow {
        ChunkWindow::new(self.start, self.end, stride)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}
