//! In-memory view of a chain cursor, backed by the durable store.
//!
//! The persisted value is the source of truth. The in-memory value only moves
//! after the write was attempted, and never backwards.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

use crate::db::CursorStore;
use crate::metrics;
use crate::types::Chain;

pub struct Cursor {
    chain: Chain,
    last_block: Mutex<u64>,
    store: Arc<dyn CursorStore>,
}

impl Cursor {
    /// Load the persisted cursor. A read failure is treated as "no cursor".
    pub async fn load(chain: Chain, store: Arc<dyn CursorStore>) -> Self {
        let last_block = match store.last_block(chain).await {
            Ok(block) => block.unwrap_or(0),
            Err(e) => {
                error!(chain = %chain, error = %e, "Failed to read last block, starting from configured height");
                0
            }
        };

        Self {
            chain,
            last_block: Mutex::new(last_block),
            store,
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub async fn last_block(&self) -> u64 {
        *self.last_block.lock().await
    }

    /// Block to resume scanning from: the configured start height when no
    /// cursor was ever stored, otherwise the block after the cursor.
    pub async fn start_block(&self, configured_start: u64) -> u64 {
        match self.last_block().await {
            0 => configured_start,
            last => last + 1,
        }
    }

    /// Block to re-subscribe from within a running process. The cursor block
    /// itself is fetched again because it may have been only partly delivered.
    pub async fn resume_block(&self, configured_start: u64) -> u64 {
        match self.last_block().await {
            0 => configured_start,
            last => last,
        }
    }

    /// Move the cursor forward to `block` if it is ahead.
    ///
    /// The write happens before the in-memory update. A failed write is
    /// logged and processing continues; the store keeps its old value, so a
    /// restart re-scans instead of skipping. Returns whether the cursor moved.
    pub async fn advance(&self, block: u64) -> bool {
        let mut last = self.last_block.lock().await;
        if block <= *last {
            return false;
        }

        if let Err(e) = self.store.set_last_block(self.chain, block).await {
            error!(
                chain = %self.chain,
                from = *last,
                to = block,
                error = %e,
                "Failed to update last block found"
            );
            metrics::record_error(self.chain.as_str(), "cursor_write");
        }

        *last = block;
        metrics::set_latest_block(self.chain.as_str(), block);
        true
    }
}
