use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;

use super::ConfirmationSource;
use crate::evm_client::EvmChain;
use crate::types::PendingTransfer;

/// Depth of an Ethereum transaction: head minus its block, 0 while pending
pub struct EvmConfirmation {
    chain: Arc<dyn EvmChain>,
}

impl EvmConfirmation {
    pub fn new(chain: Arc<dyn EvmChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ConfirmationSource for EvmConfirmation {
    async fn confirmations(&self, transfer: &mut PendingTransfer) -> Result<u64> {
        let current_block = self.chain.block_number().await?;

        let Some(tx_block) = self.chain.transaction_block(&transfer.source_tx_hash).await? else {
            return Ok(0);
        };

        Ok(current_block.saturating_sub(tx_block))
    }
}
