//! Confirmation Tracker
//!
//! Each detected transfer gets its own task that polls the origin chain for
//! confirmation depth and, once the per-chain threshold is met, hands the
//! transfer to the [`RelayExecutor`]. Failed relays put the task back into
//! polling; terminal outcomes end it.
//!
//! A hash that is already being tracked is never given a second task. A new
//! sighting refreshes the running task's view of the transfer instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics;
use crate::types::{format_amount, Chain, PendingTransfer, TransferKey, TransferState};
use crate::writers::{RelayExecutor, RetryPolicy};

pub mod evm;
pub mod talleo;

pub use evm::EvmConfirmation;
pub use talleo::TalleoConfirmation;

/// Reports how deep a transfer's source transaction is buried
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Confirmations of `transfer` on its origin chain; 0 while unmined.
    /// May refresh fields the origin chain reports only on lookup.
    async fn confirmations(&self, transfer: &mut PendingTransfer) -> Result<u64>;
}

/// Thresholds and timing for the per-transfer tasks
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub poll_interval: Duration,
    pub ethereum_confirmations: u64,
    pub talleo_confirmations: u64,
    pub retry: RetryPolicy,
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.relay.poll_interval_ms),
            ethereum_confirmations: config.evm.confirmations,
            talleo_confirmations: config.talleo.confirmations,
            retry: RetryPolicy::from_config(&config.relay),
        }
    }

    fn threshold(&self, chain: Chain) -> u64 {
        match chain {
            Chain::Ethereum => self.ethereum_confirmations,
            Chain::Talleo => self.talleo_confirmations,
        }
    }
}

pub struct ConfirmationTracker {
    settings: TrackerSettings,
    ethereum: Arc<dyn ConfirmationSource>,
    talleo: Arc<dyn ConfirmationSource>,
    executor: Arc<RelayExecutor>,
    live: HashMap<TransferKey, watch::Sender<PendingTransfer>>,
    tasks: JoinSet<(TransferKey, TransferState)>,
}

impl ConfirmationTracker {
    pub fn new(
        settings: TrackerSettings,
        ethereum: Arc<dyn ConfirmationSource>,
        talleo: Arc<dyn ConfirmationSource>,
        executor: Arc<RelayExecutor>,
    ) -> Self {
        Self {
            settings,
            ethereum,
            talleo,
            executor,
            live: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.live.len()
    }

    /// Track transfers from `incoming` until shutdown.
    ///
    /// Once every sender is dropped the tracker keeps running until the
    /// transfers already in flight reach a terminal state.
    pub async fn run(
        mut self,
        mut incoming: mpsc::Receiver<PendingTransfer>,
        mut shutdown: mpsc::Receiver<()>,
    ) -> Result<()> {
        info!("Starting confirmation tracker");
        let mut accepting = true;

        loop {
            if !accepting && self.tasks.is_empty() {
                info!("Confirmation tracker drained");
                return Ok(());
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(tracked = self.live.len(), "Confirmation tracker shutting down");
                    self.tasks.abort_all();
                    return Ok(());
                }
                received = incoming.recv(), if accepting => match received {
                    Some(transfer) => self.track(transfer),
                    None => accepting = false,
                },
                Some(finished) = self.tasks.join_next() => match finished {
                    Ok((key, state)) => self.finish(key, state),
                    Err(e) => {
                        error!(error = %e, "Transfer task failed");
                        self.live.retain(|_, sender| !sender.is_closed());
                        metrics::set_tracked_transfers(self.live.len());
                    }
                },
            }
        }
    }

    /// Start tracking a transfer, or refresh the task already tracking it
    pub fn track(&mut self, transfer: PendingTransfer) {
        let key = transfer.key();

        if let Some(sender) = self.live.get(&key) {
            if !sender.is_closed() {
                debug!(transfer = %key, "Transfer already tracked, refreshing");
                sender.send_modify(|current| current.refresh_from(&transfer));
                return;
            }
        }

        info!(
            transfer = %key,
            amount = %format_amount(transfer.amount),
            to = ?transfer.to_address,
            "Tracking transfer"
        );

        let source = match transfer.origin {
            Chain::Ethereum => self.ethereum.clone(),
            Chain::Talleo => self.talleo.clone(),
        };
        let worker = TransferWorker {
            key: key.clone(),
            source,
            executor: self.executor.clone(),
            threshold: self.settings.threshold(transfer.origin),
            poll_interval: self.settings.poll_interval,
            retry: self.settings.retry.clone(),
        };

        let (sender, receiver) = watch::channel(transfer);
        self.live.insert(key.clone(), sender);
        self.tasks.spawn(async move {
            let state = worker.run(receiver).await;
            (key, state)
        });
        metrics::set_tracked_transfers(self.live.len());
    }

    fn finish(&mut self, key: TransferKey, state: TransferState) {
        debug!(transfer = %key, state = %state, "Transfer finished");
        // A newer task may have replaced a closed entry under the same key
        if self.live.get(&key).is_some_and(|sender| sender.is_closed()) {
            self.live.remove(&key);
        }
        metrics::record_relay_outcome(key.origin.as_str(), state.as_str());
        metrics::set_tracked_transfers(self.live.len());
    }
}

/// Confirm-and-relay loop for one transfer
struct TransferWorker {
    key: TransferKey,
    source: Arc<dyn ConfirmationSource>,
    executor: Arc<RelayExecutor>,
    threshold: u64,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl TransferWorker {
    async fn run(self, mut updates: watch::Receiver<PendingTransfer>) -> TransferState {
        let mut failures = 0u32;
        let mut delay = self.poll_interval;

        loop {
            tokio::time::sleep(delay).await;
            delay = self.poll_interval;

            let mut transfer = updates.borrow_and_update().clone();
            let depth = match self.source.confirmations(&mut transfer).await {
                Ok(depth) => depth,
                Err(e) => {
                    warn!(transfer = %self.key, error = %e, "Failed to get confirmations");
                    metrics::record_error(self.key.origin.as_str(), "confirmation");
                    0
                }
            };

            if depth < self.threshold {
                debug!(
                    transfer = %self.key,
                    confirmations = depth,
                    required = self.threshold,
                    "Waiting for confirmations"
                );
                continue;
            }

            info!(
                transfer = %self.key,
                confirmations = depth,
                amount = %format_amount(transfer.amount),
                "Transfer confirmed"
            );

            match self.executor.relay(&transfer).await {
                Ok(outcome) => {
                    let state = outcome.state();
                    info!(transfer = %self.key, state = %state, "Transfer complete");
                    return state;
                }
                Err(e) => {
                    failures += 1;
                    error!(
                        transfer = %self.key,
                        attempt = failures,
                        error = %e,
                        "Relay failed"
                    );
                    metrics::record_error(self.key.origin.as_str(), "relay");

                    if !self.retry.should_retry(failures) {
                        warn!(transfer = %self.key, attempts = failures, "Giving up on transfer");
                        return TransferState::Abandoned;
                    }
                    delay = self.retry.delay_after_failure(failures);
                }
            }
        }
    }
}
