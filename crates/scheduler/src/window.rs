//! Chunk alignment and preload window planning
//!
//! Chunks are laid out on a fixed stride starting at the domain start.
//! The preload window is the viewed chunk plus a margin of chunks on each
//! side; keys are ordered nearest-first so the chunk under the viewport is
//! requested before the margins.

use crate::coordinator::ChunkKey;

/// Chunk grid over a half-open address domain `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    start: u64,
    end: u64,
    stride: u64,
}

impl ChunkWindow {
    /// Create a grid; a zero stride is raised to one and reversed bounds
    /// are swapped
    pub fn new(start: u64, end: u64, stride: u64) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        Self {
            start,
            end,
            stride: stride.max(1),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Clamp an address into the domain
    ///
    /// Addresses at or past the end map to the last addressable byte.
    pub fn clamp(&self, address: u64) -> u64 {
        if self.end == self.start {
            self.start
        } else {
            address.clamp(self.start, self.end - 1)
        }
    }

    /// Whether `address` lies inside the domain
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    /// Key of the chunk owning `address`, after clamping into the domain
    pub fn key_for(&self, address: u64) -> ChunkKey {
        let offset = self.clamp(address) - self.start;
        self.start + offset / self.stride * self.stride
    }

    /// Number of bytes a chunk at `key` may cover, shortened at the end
    pub fn span_len(&self, key: ChunkKey) -> u64 {
        self.end.saturating_sub(key).min(self.stride)
    }

    /// Number of chunks needed to cover the domain
    pub fn chunk_count(&self) -> u64 {
        (self.end - self.start).div_ceil(self.stride)
    }

    /// Keys of the chunk owning `address` and up to `margin` chunks on
    /// each side, nearest first, clamped to the domain
    pub fn keys_around(&self, address: u64, margin: u32) -> Vec<ChunkKey> {
        if self.end == self.start {
            return Vec::new();
        }

        let center = self.key_for(address);
        let mut keys = vec![center];

        for distance in 1..=u64::from(margin) {
            let step = distance.saturating_mul(self.stride);

            if let Some(before) = center.checked_sub(step) {
                if before >= self.start {
                    keys.push(before);
                }
            }
            if let Some(after) = center.checked_add(step) {
                if after < self.end {
                    keys.push(after);
                }
            }
        }

        keys
    }
}
