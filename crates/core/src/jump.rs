//! Scrollbar jumps
//!
//! Dragging the scrollbar issues a stream of jump targets. Only the latest
//! one matters, so each new jump aborts the previous one without waiting.

use crate::bytes::ByteWindowCache;
use crate::chunked::LoadOutcome;
use crate::error::FetchResult;
use crate::records::RecordWindowCache;
use addrscope_scheduler::TaskSlot;
use async_trait::async_trait;
use tokio::task::JoinHandle;

/// Cache that can reposition itself around an address
#[async_trait]
pub trait JumpTarget: Clone + Send + Sync + 'static {
    async fn jump_to(&self, address: u64) -> FetchResult<LoadOutcome>;
}

#[async_trait]
impl JumpTarget for ByteWindowCache {
    /// Loads the target chunk, then its configured preload margin
    async fn jump_to(&self, address: u64) -> FetchResult<LoadOutcome> {
        let outcome = self.load_chunk_around_address(address).await?;
        self.preload_default(address).await;
        Ok(outcome)
    }
}

#[async_trait]
impl JumpTarget for RecordWindowCache {
    /// Rebuilds the record store around the target
    async fn jump_to(&self, address: u64) -> FetchResult<LoadOutcome> {
        self.reset_and_load_around(address).await
    }
}

/// Owns at most one running jump for a cache
pub struct JumpController<C> {
    target: C,
    slot: TaskSlot,
}

impl<C: JumpTarget> JumpController<C> {
    pub fn new(target: C) -> Self {
        Self {
            target,
            slot: TaskSlot::new(),
        }
    }

    pub fn target(&self) -> &C {
        &self.target
    }

    /// Start a jump to `address`, aborting any jump still running
    ///
    /// Must be called from within a Tokio runtime.
    pub fn jump(&self, address: u64) -> JoinHandle<FetchResult<LoadOutcome>> {
        let target = self.target.clone();
        tracing::debug!(address, "jump requested");
        self.slot.replace(async move { target.jump_to(address).await })
    }

    /// Abort the running jump; returns `true` if one was running
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_jumping(&self) -> bool {
        self.slot.is_active()
    }
}
