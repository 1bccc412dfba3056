//! In-memory backend for cache tests

use crate::error::FetchError;
use crate::record::Record;
use crate::source::DataSource;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::{watch, Notify};

/// Backend over a byte image mapped at `base`
///
/// Records are fixed-width slices of the image. Fetches can be held at a
/// gate to simulate a slow backend, and every request is logged.
pub(crate) struct MockSource {
    base: u64,
    record_size: AtomicU32,
    image: Mutex<Vec<u8>>,
    byte_requests: Mutex<Vec<(u64, u32)>>,
    record_requests: Mutex<Vec<(u64, u32)>>,
    fail: AtomicBool,
    gate: watch::Sender<bool>,
    pub entered: Notify,
}

impl MockSource {
    pub fn new(base: u64, image: Vec<u8>, record_size: u32) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            base,
            record_size: AtomicU32::new(record_size.max(1)),
            image: Mutex::new(image),
            byte_requests: Mutex::new(Vec::new()),
            record_requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            gate,
            entered: Notify::new(),
        }
    }

    /// Image where each byte is its offset modulo 251
    pub fn patterned(base: u64, len: usize, record_size: u32) -> Self {
        let image = (0..len).map(|i| (i % 251) as u8).collect();
        Self::new(base, image, record_size)
    }

    pub fn byte_at(&self, address: u64) -> u8 {
        self.image.lock().unwrap()[(address - self.base) as usize]
    }

    /// Overwrite the image, as a patch in the backend would
    pub fn write(&self, address: u64, bytes: &[u8]) {
        let offset = (address - self.base) as usize;
        self.image.lock().unwrap()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Change the width of records decoded from now on
    pub fn set_record_size(&self, size: u32) {
        self.record_size.store(size.max(1), Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Block fetches until [`MockSource::release`]
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn byte_requests(&self) -> Vec<(u64, u32)> {
        self.byte_requests.lock().unwrap().clone()
    }

    pub fn record_requests(&self) -> Vec<(u64, u32)> {
        self.record_requests.lock().unwrap().clone()
    }

    async fn pass_gate(&self) -> Result<(), FetchError> {
        self.entered.notify_one();
        let mut open = self.gate.subscribe();
        loop {
            if *open.borrow_and_update() {
                break;
            }
            if open.changed().await.is_err() {
                return Err(FetchError::Disconnected);
            }
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Backend("injected failure".to_string()));
        }
        Ok(())
    }

    fn slice(&self, address: u64, length: u64) -> Vec<u8> {
        let image = self.image.lock().unwrap();
        let Some(offset) = address.checked_sub(self.base) else {
            return Vec::new();
        };
        let start = (offset as usize).min(image.len());
        let end = (offset.saturating_add(length) as usize).min(image.len());
        image[start..end].to_vec()
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_bytes(&self, address: u64, length: u32) -> Result<Vec<u8>, FetchError> {
        self.byte_requests.lock().unwrap().push((address, length));
        self.pass_gate().await?;
        Ok(self.slice(address, u64::from(length)))
    }

    async fn fetch_records(&self, address: u64, count: u32) -> Result<Vec<Record>, FetchError> {
        self.record_requests.lock().unwrap().push((address, count));
        self.pass_gate().await?;

        let width = self.record_size.load(Ordering::SeqCst);
        let size = u64::from(width);
        let records = (0..u64::from(count))
            .map(|i| address + i * size)
            .map(|at| (at, self.slice(at, size)))
            .take_while(|(_, bytes)| bytes.len() as u64 == size)
            .map(|(at, bytes)| {
                let text = hex::encode(&bytes);
                Record::new(at, width, bytes, text)
            })
            .collect();
        Ok(records)
    }
}
