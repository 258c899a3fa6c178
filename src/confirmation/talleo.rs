//! Talleo confirmation checks
//!
//! The scanner only knows deposit hashes, so every poll also re-reads the
//! amount and payment id from the wallet. A deposit's inclusion block moves
//! the Talleo cursor forward.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::debug;

use super::ConfirmationSource;
use crate::address_codec::payment_id_to_eth;
use crate::state::Cursor;
use crate::talleo_client::TalleoRpc;
use crate::types::PendingTransfer;

pub struct TalleoConfirmation {
    rpc: Arc<dyn TalleoRpc>,
    cursor: Arc<Cursor>,
}

impl TalleoConfirmation {
    pub fn new(rpc: Arc<dyn TalleoRpc>, cursor: Arc<Cursor>) -> Self {
        Self { rpc, cursor }
    }
}

#[async_trait]
impl ConfirmationSource for TalleoConfirmation {
    async fn confirmations(&self, transfer: &mut PendingTransfer) -> Result<u64> {
        let height = self.rpc.network_height().await?;
        let tx = self.rpc.get_transaction(&transfer.source_tx_hash).await?;

        transfer.amount = tx.received_amount();
        transfer.to_address = payment_id_to_eth(&tx.payment_id).ok();
        let block = tx.block_height();
        transfer.payment_id = Some(tx.payment_id);

        // Unconfirmed transactions report no usable block
        let Some(block) = block else {
            debug!(tx_hash = %transfer.source_tx_hash, "Deposit not yet in a block");
            return Ok(0);
        };

        self.cursor.advance(block).await;
        Ok(height.saturating_sub(block))
    }
}
