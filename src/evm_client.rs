//! Ethereum RPC access for confirmation checks and `convertFrom` submission
//!
//! Reads go through an HTTP provider. Signing happens locally in the writer;
//! this client only broadcasts the raw transaction and waits for its receipt.

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::BlockTransactionsKind;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::str::FromStr;
use tracing::info;

/// Operations the bridge needs from Ethereum
#[async_trait]
pub trait EvmChain: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    /// Block containing `tx_hash`, or None while pending
    async fn transaction_block(&self, tx_hash: &str) -> Result<Option<u64>>;

    /// Gas limit of the latest block
    async fn latest_gas_limit(&self) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    async fn transaction_count(&self, address: Address) -> Result<u64>;

    /// Broadcast a signed transaction and wait for a successful receipt.
    /// Returns the transaction hash.
    async fn send_raw_and_wait(&self, raw: Bytes) -> Result<String>;
}

/// HTTP JSON-RPC client
pub struct EvmClient {
    provider: RootProvider<Http<Client>>,
}

impl EvmClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url = rpc_url.parse().wrap_err("Failed to parse RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);
        Ok(Self { provider })
    }
}

#[async_trait]
impl EvmChain for EvmClient {
    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }

    async fn transaction_block(&self, tx_hash: &str) -> Result<Option<u64>> {
        let hash = B256::from_str(tx_hash)
            .map_err(|e| eyre!("Invalid transaction hash {}: {}", tx_hash, e))?;
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .wrap_err("Failed to get transaction")?;

        Ok(tx.and_then(|tx| tx.block_number))
    }

    async fn latest_gas_limit(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
            .await
            .wrap_err("Failed to get latest block")?
            .ok_or_else(|| eyre!("Latest block not available"))?;

        Ok(block.header.gas_limit)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .wrap_err("Failed to get gas price")
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .await
            .wrap_err("Failed to get transaction count")
    }

    async fn send_raw_and_wait(&self, raw: Bytes) -> Result<String> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| eyre!("Failed to send transaction: {}", e))?;

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "Transaction sent, waiting for receipt");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;

        if !receipt.status() {
            return Err(eyre!("Transaction {} reverted", tx_hash));
        }

        Ok(format!("0x{:x}", receipt.transaction_hash))
    }
}
