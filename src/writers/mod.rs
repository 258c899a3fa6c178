//! Relay writers
//!
//! [`RelayExecutor`] is the single entry point for paying out a confirmed
//! transfer. It consults the completion marker, applies the dust threshold,
//! dispatches to the writer for the destination chain and records the
//! destination hash once the payout went through.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use tracing::{error, info, warn};

use crate::db::CursorStore;
use crate::types::{format_amount, Chain, PendingTransfer, TransferState};

pub mod evm;
pub mod retry;
pub mod talleo;

pub use evm::EvmWriter;
pub use retry::RetryPolicy;
pub use talleo::TalleoWriter;

/// Result of a single payout attempt that reached the destination chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { tx_hash: String },
    /// The destination can never be paid; retrying is pointless
    Rejected { reason: String },
}

/// Terminal outcome of [`RelayExecutor::relay`]. Transient failures are
/// returned as `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed { dest_tx_hash: String },
    AlreadyRelayed,
    BelowMinimum,
    InvalidDestination { reason: String },
}

impl RelayOutcome {
    pub fn state(&self) -> TransferState {
        match self {
            RelayOutcome::Relayed { .. } => TransferState::Relayed,
            RelayOutcome::AlreadyRelayed => TransferState::AlreadyRelayed,
            RelayOutcome::BelowMinimum => TransferState::BelowMinimum,
            RelayOutcome::InvalidDestination { .. } => TransferState::InvalidDestination,
        }
    }
}

pub struct RelayExecutor {
    store: Arc<dyn CursorStore>,
    talleo: TalleoWriter,
    evm: EvmWriter,
    /// Amounts at or below this are dropped
    min_amount: u64,
    claim_markers: bool,
}

impl RelayExecutor {
    pub fn new(
        store: Arc<dyn CursorStore>,
        talleo: TalleoWriter,
        evm: EvmWriter,
        min_amount: u64,
        claim_markers: bool,
    ) -> Self {
        Self {
            store,
            talleo,
            evm,
            min_amount,
            claim_markers,
        }
    }

    /// Pay out a confirmed transfer on its counterpart chain.
    ///
    /// Errors leave no marker behind, so the caller may run the whole
    /// confirm-and-relay cycle again.
    pub async fn relay(&self, transfer: &PendingTransfer) -> Result<RelayOutcome> {
        let chain = transfer.origin;
        let hash = transfer.source_tx_hash.as_str();

        let existing = self
            .store
            .completion(chain, hash)
            .await
            .wrap_err("Failed to read completion marker")?;
        if let Some(dest_tx_hash) = existing {
            info!(
                chain = %chain,
                tx_hash = %hash,
                dest_tx_hash = %dest_tx_hash,
                "Transaction already converted"
            );
            return Ok(RelayOutcome::AlreadyRelayed);
        }

        if transfer.amount <= self.min_amount {
            info!(
                chain = %chain,
                tx_hash = %hash,
                amount = %format_amount(transfer.amount),
                minimum = %format_amount(self.min_amount),
                "Amount below minimum, not converting"
            );
            return Ok(RelayOutcome::BelowMinimum);
        }

        if self.claim_markers {
            let claimed = self
                .store
                .claim_completion(chain, hash)
                .await
                .wrap_err("Failed to claim completion marker")?;
            if !claimed {
                info!(chain = %chain, tx_hash = %hash, "Conversion claimed elsewhere");
                return Ok(RelayOutcome::AlreadyRelayed);
            }
        }

        let delivery = match chain {
            Chain::Ethereum => self.talleo.pay_out(transfer).await,
            Chain::Talleo => self.evm.mint(transfer).await,
        };

        match delivery {
            Ok(Delivery::Sent { tx_hash }) => {
                // The payout is done; a lost marker cannot be retried safely
                if let Err(e) = self.store.set_completion(chain, hash, &tx_hash).await {
                    error!(
                        chain = %chain,
                        tx_hash = %hash,
                        dest_tx_hash = %tx_hash,
                        error = %e,
                        "Failed to save conversion result"
                    );
                    crate::metrics::record_error(chain.as_str(), "marker_write");
                }
                Ok(RelayOutcome::Relayed {
                    dest_tx_hash: tx_hash,
                })
            }
            Ok(Delivery::Rejected { reason }) => {
                self.release(chain, hash).await;
                Ok(RelayOutcome::InvalidDestination { reason })
            }
            Err(e) => {
                self.release(chain, hash).await;
                Err(e)
            }
        }
    }

    async fn release(&self, chain: Chain, hash: &str) {
        if !self.claim_markers {
            return;
        }
        if let Err(e) = self.store.release_claim(chain, hash).await {
            warn!(chain = %chain, tx_hash = %hash, error = %e, "Failed to release claim");
        }
    }
}
