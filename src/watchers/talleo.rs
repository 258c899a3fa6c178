//! Talleo Scanner - walks wallet history for deposits to the bridge address
//!
//! Talleo has no event stream, so the scanner asks the wallet for the
//! transaction hashes touching the bridge address in fixed-size block
//! windows. Windows stop `safety_lag` blocks below the network height to stay
//! clear of blocks that may still be replaced.

use std::sync::Arc;

use eyre::Result;
use tokio::sync::mpsc;

use crate::config::{ScannerConfig, TalleoConfig};
use crate::metrics;
use crate::state::Cursor;
use crate::talleo_client::TalleoRpc;
use crate::types::{Chain, PendingTransfer};

/// Number of blocks to request from `first_block`, or None when the scanner
/// has caught up with the safe height
pub fn scan_window(first_block: u64, height: u64, safety_lag: u64, batch_size: u64) -> Option<u64> {
    let safe_height = height.saturating_sub(safety_lag);
    if first_block >= safe_height {
        return None;
    }
    Some(batch_size.min(safe_height - first_block))
}

/// What one scanner iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Nothing new below the safe height
    CaughtUp,
    /// A window was scanned; continue from `next_block`
    Scanned { next_block: u64 },
    /// A transient error; try the same window again
    Retry,
}

pub struct TalleoScanner {
    rpc: Arc<dyn TalleoRpc>,
    addresses: Vec<String>,
    start_height: u64,
    config: ScannerConfig,
    cursor: Arc<Cursor>,
    sink: mpsc::Sender<PendingTransfer>,
    last_height: Option<u64>,
}

impl TalleoScanner {
    pub fn new(
        talleo: &TalleoConfig,
        config: ScannerConfig,
        rpc: Arc<dyn TalleoRpc>,
        cursor: Arc<Cursor>,
        sink: mpsc::Sender<PendingTransfer>,
    ) -> Self {
        Self {
            rpc,
            addresses: vec![talleo.bridge_address.clone()],
            start_height: talleo.start_height,
            config,
            cursor,
            sink,
            last_height: None,
        }
    }

    /// Run the scanner loop. Returns an error only when no safe starting
    /// point can be established or the tracker has gone away.
    pub async fn run(mut self) -> Result<()> {
        let mut first_block = self.cursor.start_block(self.start_height).await;
        tracing::info!(first_block, "Scanning Talleo history");

        loop {
            if let ScanStep::Scanned { next_block } = self.step(first_block).await? {
                first_block = next_block;
            }
            tokio::time::sleep(self.config.interval()).await;
        }
    }

    pub async fn step(&mut self, first_block: u64) -> Result<ScanStep> {
        let height = match self.rpc.network_height().await {
            Ok(height) => height,
            Err(e) => {
                tracing::error!(error = %e, "Failed to get Talleo network height");
                metrics::record_error(Chain::Talleo.as_str(), "height");
                return Ok(ScanStep::Retry);
            }
        };

        if self.last_height != Some(height) {
            tracing::info!(height, "Current block height");
            self.last_height = Some(height);
        }

        let Some(block_count) =
            scan_window(first_block, height, self.config.safety_lag, self.config.batch_size)
        else {
            return Ok(ScanStep::CaughtUp);
        };
        let last_block = first_block + block_count - 1;

        let hashes = match self
            .rpc
            .transaction_hashes(&self.addresses, first_block, block_count)
            .await
        {
            Ok(hashes) => hashes,
            Err(e) if first_block == 0 => {
                tracing::error!(error = %e, "Cannot read history from genesis");
                return Err(e.wrap_err("Cannot establish a safe starting point"));
            }
            Err(e) => {
                tracing::error!(
                    first_block,
                    last_block,
                    error = %e,
                    "Failed to get transaction hashes"
                );
                metrics::record_error(Chain::Talleo.as_str(), "history");
                return Ok(ScanStep::Retry);
            }
        };

        tracing::info!(
            first_block,
            last_block,
            transactions = hashes.len(),
            "Scanned Talleo blocks"
        );

        for hash in hashes {
            tracing::info!(tx_hash = %hash, "New deposit detected");
            metrics::record_transfer_detected(Chain::Talleo.as_str());
            self.sink
                .send(PendingTransfer::from_talleo(hash, first_block))
                .await
                .map_err(|_| eyre::eyre!("Confirmation tracker is not accepting transfers"))?;
        }

        Ok(ScanStep::Scanned {
            next_block: first_block + block_count,
        })
    }
}
