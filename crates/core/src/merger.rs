//! Canonical record store
//!
//! All record chunks fold into one sorted sequence with unique addresses.
//! Every merge re-materializes the whole sequence: merges happen on scroll
//! and load events, not per byte, so the simple full re-sort is affordable.

use crate::record::Record;
use std::collections::BTreeMap;

/// Sorted, address-unique view of every merged record
///
/// Invariant: addresses are strictly increasing after every operation.
#[derive(Debug, Default, Clone)]
pub struct RecordMerger {
    records: Vec<Record>,
}

impl RecordMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch into the store
    ///
    /// An incoming record replaces any stored record at the same address,
    /// and a later duplicate inside the batch replaces an earlier one. The
    /// batch may be unsorted and may overlap what is already stored.
    pub fn merge<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = Record>,
    {
        let mut by_address: BTreeMap<u64, Record> = self
            .records
            .drain(..)
            .map(|record| (record.address, record))
            .collect();

        for record in batch {
            by_address.insert(record.address, record);
        }

        self.records = by_address.into_values().collect();
    }

    /// Drop every record overlapping `[start, end)`
    ///
    /// Returns the number of records removed.
    pub fn remove_span(&mut self, start: u64, end: u64) -> usize {
        if start >= end {
            return 0;
        }
        let before = self.records.len();
        self.records.retain(|r| r.address >= end || r.end() <= start);
        before - self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Record starting exactly at `address`
    pub fn find(&self, address: u64) -> Option<&Record> {
        self.records
            .binary_search_by_key(&address, |r| r.address)
            .ok()
            .map(|index| &self.records[index])
    }

    /// Record whose bytes cover `address`
    pub fn containing(&self, address: u64) -> Option<&Record> {
        let after = self.records.partition_point(|r| r.address <= address);
        let candidate = self.records.get(after.checked_sub(1)?)?;
        candidate.covers(address).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn rec(address: u64, size: u32) -> Record {
        Record::new(address, size, vec![0; size as usize], format!("r{:x}", address))
    }

    fn assert_strictly_increasing(merger: &RecordMerger) {
        for pair in merger.records().windows(2) {
            assert!(
                pair[0].address < pair[1].address,
                "{:#x} not below {:#x}",
                pair[0].address,
                pair[1].address
            );
        }
    }

    #[test]
    fn test_merge_sorts_batch() {
        let mut merger = RecordMerger::new();
        merger.merge(vec![rec(8, 4), rec(0, 4), rec(4, 4)]);

        let addresses: Vec<u64> = merger.records().iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0, 4, 8]);
    }

    #[test]
    fn test_incoming_record_wins() {
        let mut merger = RecordMerger::new();
        merger.merge(vec![rec(0, 4), rec(4, 4)]);

        let mut patched = rec(4, 2);
        patched.text = "patched".to_string();
        merger.merge(vec![patched]);

        assert_eq!(merger.len(), 2);
        assert_eq!(merger.find(4).unwrap().text, "patched");
        assert_eq!(merger.find(4).unwrap().size, 2);
    }

    #[test]
    fn test_later_duplicate_in_batch_wins() {
        let mut merger = RecordMerger::new();
        let mut second = rec(0, 4);
        second.text = "second".to_string();
        merger.merge(vec![rec(0, 4), second]);

        assert_eq!(merger.len(), 1);
        assert_eq!(merger.find(0).unwrap().text, "second");
    }

    #[test]
    fn test_random_overlapping_batches_stay_canonical() {
        let mut rng = rand::thread_rng();
        let mut merger = RecordMerger::new();

        for _ in 0..200 {
            let base = rng.gen_range(0..1_000u64) * 4;
            let mut batch: Vec<Record> =
                (0..rng.gen_range(0..40u64)).map(|i| rec(base + i * 4, 4)).collect();
            batch.shuffle(&mut rng);
            if let Some(dup) = batch.first().cloned() {
                batch.push(dup);
            }

            merger.merge(batch);
            assert_strictly_increasing(&merger);
        }
    }

    #[test]
    fn test_merge_empty_batch_is_noop() {
        let mut merger = RecordMerger::new();
        merger.merge(vec![rec(0, 4)]);
        merger.merge(Vec::new());
        assert_eq!(merger.len(), 1);
    }

    #[test]
    fn test_remove_span() {
        let mut merger = RecordMerger::new();
        merger.merge((0..10).map(|i| rec(i * 4, 4)));

        assert_eq!(merger.remove_span(8, 20), 3);
        let addresses: Vec<u64> = merger.records().iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0, 4, 20, 24, 28, 32, 36]);

        assert_eq!(merger.remove_span(100, 200), 0);
        assert_eq!(merger.remove_span(20, 8), 0);
    }

    #[test]
    fn test_remove_span_takes_overlapping_records() {
        let mut merger = RecordMerger::new();
        merger.merge(vec![rec(0x10, 8), rec(0x18, 4), rec(0x1c, 8), rec(0x24, 4)]);

        // 0x10 reaches into the span and 0x1c reaches past its end
        assert_eq!(merger.remove_span(0x14, 0x20), 3);
        let addresses: Vec<u64> = merger.records().iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0x24]);
    }

    #[test]
    fn test_find_and_containing() {
        let mut merger = RecordMerger::new();
        merger.merge(vec![rec(0x10, 4), rec(0x14, 2), rec(0x20, 4)]);

        assert_eq!(merger.find(0x14).map(|r| r.size), Some(2));
        assert!(merger.find(0x15).is_none());

        assert_eq!(merger.containing(0x15).map(|r| r.address), Some(0x14));
        assert_eq!(merger.containing(0x23).map(|r| r.address), Some(0x20));
        assert!(merger.containing(0x16).is_none(), "gap between records");
        assert!(merger.containing(0x0f).is_none());
    }

    #[test]
    fn test_clear() {
        let mut merger = RecordMerger::new();
        merger.merge(vec![rec(0, 4)]);
        merger.clear();
        assert!(merger.is_empty());
        assert!(merger.first().is_none());
    }
}
