//! Virtual scroll index <-> address mapping
//!
//! The UI scrolls over a virtual list whose true length is unknown until the
//! whole range is decoded. These mappings degrade gracefully: before anything
//! is loaded the answers are proportional to the address space, and near
//! loaded data they become exact or tightly interpolated. Nothing here fails.

use crate::range::AddressRange;
use crate::record::Record;

/// Index mapping for variable-length records
///
/// Borrows a snapshot of the canonical store, which must be sorted by
/// address.
#[derive(Debug, Clone, Copy)]
pub struct RecordIndexer<'a> {
    range: AddressRange,
    avg_record_size: u64,
    records: &'a [Record],
}

impl<'a> RecordIndexer<'a> {
    pub fn new(range: AddressRange, avg_record_size: u32, records: &'a [Record]) -> Self {
        Self {
            range,
            avg_record_size: u64::from(avg_record_size.max(1)),
            records,
        }
    }

    /// Heuristic upper bound on the number of records in the range
    ///
    /// Derived from the range and the average record size only; it is not
    /// recalibrated from observed data.
    pub fn estimated_total_count(&self) -> u64 {
        self.range.len().div_ceil(self.avg_record_size)
    }

    /// Scroll position for `address`
    ///
    /// Exact when a record starts at `address`. Otherwise interpolated
    /// between the first and last loaded records and clamped to the loaded
    /// positions, or estimated from the range start when nothing is loaded.
    pub fn index_for_address(&self, address: u64) -> u64 {
        if let Ok(index) = self.records.binary_search_by_key(&address, |r| r.address) {
            return index as u64;
        }

        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) if last.address > first.address => {
                let max_index = (self.records.len() - 1) as f64;
                let span = (last.address - first.address) as f64;
                let offset = address as f64 - first.address as f64;
                let position = (offset / span * max_index).floor();
                position.clamp(0.0, max_index) as u64
            }
            (Some(_), Some(_)) => 0,
            _ => address.saturating_sub(self.range.start()) / self.avg_record_size,
        }
    }

    /// Address shown at scroll position `index`
    ///
    /// Exact inside the loaded store, otherwise `start + index * avg`
    /// clamped to `[start, end]`.
    pub fn address_for_index(&self, index: u64) -> u64 {
        if let Some(record) = usize::try_from(index).ok().and_then(|i| self.records.get(i)) {
            return record.address;
        }

        let estimate = self
            .range
            .start()
            .saturating_add(index.saturating_mul(self.avg_record_size));
        self.range.clamp(estimate)
    }

    /// Position of the loaded record nearest to `address`
    ///
    /// Returns `None` when nothing is loaded.
    pub fn closest_index(&self, address: u64) -> Option<usize> {
        self.records
            .iter()
            .enumerate()
            .min_by_key(|(_, record)| record.address.abs_diff(address))
            .map(|(index, _)| index)
    }
}

/// Index mapping for fixed-width byte rows
#[derive(Debug, Clone, Copy)]
pub struct ByteIndexer {
    range: AddressRange,
    row_width: u64,
}

impl ByteIndexer {
    pub fn new(range: AddressRange, row_width: u32) -> Self {
        Self {
            range,
            row_width: u64::from(row_width.max(1)),
        }
    }

    pub fn row_width(&self) -> u64 {
        self.row_width
    }

    /// Number of rows covering the range; the last row may be partial
    pub fn row_count(&self) -> u64 {
        self.range.len().div_ceil(self.row_width)
    }

    /// Row holding `address`, clamped to the last row
    pub fn index_for_address(&self, address: u64) -> u64 {
        let row = address.saturating_sub(self.range.start()) / self.row_width;
        row.min(self.row_count().saturating_sub(1))
    }

    /// First address of row `index`, clamped to `[start, end]`
    pub fn address_for_index(&self, index: u64) -> u64 {
        let address = self
            .range
            .start()
            .saturating_add(index.saturating_mul(self.row_width));
        self.range.clamp(address)
    }
}
