//! EVM Writer - mints WTLO for confirmed Talleo deposits
//!
//! Decodes the deposit's payment id into the Ethereum recipient, then runs the
//! submission steps in order: gas quote, owner nonce, local signing, broadcast
//! and receipt. The owner key never leaves this process.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};

use crate::address_codec::{is_valid_evm_address, payment_id_to_eth, talleo_address_to_bytes};
use crate::config::EvmConfig;
use crate::contracts::WrappedTalleo;
use crate::evm_client::EvmChain;
use crate::types::{format_amount, PendingTransfer};
use crate::writers::Delivery;

/// Gas settings for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GasQuote {
    gas_limit: u64,
    gas_price: u128,
}

/// EVM transaction writer for `convertFrom`
pub struct EvmWriter {
    chain: Arc<dyn EvmChain>,
    wallet: EthereumWallet,
    owner: Address,
    contract: Address,
    chain_id: u64,
    gas: u64,
    gas_limit_margin: u64,
    receipt_timeout: Duration,
    /// The Talleo bridge address as raw bytes, the `from` argument
    bridge_address: Bytes,
}

impl EvmWriter {
    pub fn new(config: &EvmConfig, talleo_bridge_address: &str, chain: Arc<dyn EvmChain>) -> Result<Self> {
        let contract =
            Address::from_str(&config.contract_address).wrap_err("Invalid contract address")?;

        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .wrap_err("Invalid private key")?;
        let owner = signer.address();

        let bridge_address = Bytes::from(
            talleo_address_to_bytes(talleo_bridge_address)
                .wrap_err("Invalid Talleo bridge address")?,
        );

        info!(
            owner_address = %owner,
            chain_id = config.chain_id,
            contract_address = %contract,
            "EVM writer initialized"
        );

        Ok(Self {
            chain,
            wallet: EthereumWallet::from(signer),
            owner,
            contract,
            chain_id: config.chain_id,
            gas: config.gas,
            gas_limit_margin: config.gas_limit_margin,
            receipt_timeout: Duration::from_millis(config.receipt_timeout_ms),
            bridge_address,
        })
    }

    /// Mint the deposit's full amount to the address its payment id encodes
    pub async fn mint(&self, transfer: &PendingTransfer) -> Result<Delivery> {
        let recipient = match self.recipient(transfer) {
            Ok(recipient) => recipient,
            Err(reason) => {
                warn!(
                    tx_hash = %transfer.source_tx_hash,
                    payment_id = ?transfer.payment_id,
                    reason = %reason,
                    "Invalid address"
                );
                return Ok(Delivery::Rejected { reason });
            }
        };

        info!(
            tx_hash = %transfer.source_tx_hash,
            to = %recipient,
            amount = %format_amount(transfer.amount),
            "Sending WTLO"
        );

        let quote = self.quote_gas().await?;
        let nonce = self
            .chain
            .transaction_count(self.owner)
            .await
            .wrap_err("Failed to get nonce")?;
        let raw = self.sign(recipient, transfer.amount, nonce, quote).await?;

        // A dropped or evicted transaction never yields a receipt
        let tx_hash = tokio::time::timeout(self.receipt_timeout, self.chain.send_raw_and_wait(raw))
            .await
            .map_err(|_| eyre!("Transaction timed out after {:?}", self.receipt_timeout))??;
        info!(
            source_tx_hash = %transfer.source_tx_hash,
            tx_hash = %tx_hash,
            "Sent WTLO"
        );

        Ok(Delivery::Sent { tx_hash })
    }

    /// Decode and validate the recipient. Failures are permanent.
    fn recipient(&self, transfer: &PendingTransfer) -> std::result::Result<Address, String> {
        let payment_id = transfer
            .payment_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| "deposit carries no payment id".to_string())?;

        let address = payment_id_to_eth(payment_id).map_err(|e| e.to_string())?;
        if !is_valid_evm_address(&address) {
            return Err(format!("{} is not a valid Ethereum address", address));
        }

        Address::from_str(&address).map_err(|e| e.to_string())
    }

    /// Configured gas, bounded by the latest block gas limit plus the margin
    async fn quote_gas(&self) -> Result<GasQuote> {
        let block_gas_limit = self.chain.latest_gas_limit().await?;
        let gas_price = self.chain.gas_price().await?;
        let ceiling = block_gas_limit.saturating_add(self.gas_limit_margin);

        let quote = GasQuote {
            gas_limit: self.gas.min(ceiling),
            gas_price,
        };
        debug!(
            gas_limit = quote.gas_limit,
            gas_price = quote.gas_price,
            block_gas_limit,
            "Gas quote"
        );
        Ok(quote)
    }

    async fn sign(&self, to: Address, amount: u64, nonce: u64, quote: GasQuote) -> Result<Bytes> {
        let call = WrappedTalleo::convertFromCall {
            from: self.bridge_address.clone(),
            to,
            value: U256::from(amount),
        };

        let request = TransactionRequest::default()
            .with_from(self.owner)
            .with_to(self.contract)
            .with_input(call.abi_encode())
            .with_value(U256::ZERO)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_gas_limit(quote.gas_limit)
            .with_gas_price(quote.gas_price);

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;

        Ok(Bytes::from(envelope.encoded_2718()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_codec::eth_to_payment_id;
    use crate::testing::{sample_evm_config, MockEvm, BRIDGE_ADDRESS};
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::TxKind;

    const RECIPIENT: &str = "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B";

    fn deposit(payment_id: Option<String>, amount: u64) -> PendingTransfer {
        let mut transfer = PendingTransfer::from_talleo("c0ffee".to_string(), 100);
        transfer.payment_id = payment_id;
        transfer.amount = amount;
        transfer
    }

    #[tokio::test]
    async fn test_mint_signs_convert_from() {
        let chain = Arc::new(MockEvm::new());
        chain.set_gas_limit(30_000_000);
        let writer = EvmWriter::new(&sample_evm_config(), BRIDGE_ADDRESS, chain.clone()).unwrap();

        let payment_id = eth_to_payment_id(RECIPIENT).unwrap();
        let delivery = writer.mint(&deposit(Some(payment_id), 500)).await.unwrap();
        assert!(matches!(delivery, Delivery::Sent { .. }));

        let sent = chain.sent_transactions();
        assert_eq!(sent.len(), 1);

        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_ref()).unwrap();
        let tx = envelope.as_legacy().unwrap().tx();
        assert_eq!(tx.gas_limit, 120_000);
        assert_eq!(tx.to, TxKind::Call(writer.contract));
        assert_eq!(tx.chain_id, Some(sample_evm_config().chain_id));

        let call = WrappedTalleo::convertFromCall::abi_decode(&tx.input, true).unwrap();
        assert_eq!(call.to, Address::from_str(RECIPIENT).unwrap());
        assert_eq!(call.value, U256::from(500u64));
        assert_eq!(call.from, writer.bridge_address);
    }

    #[tokio::test]
    async fn test_gas_limit_bounded_by_block() {
        let chain = Arc::new(MockEvm::new());
        chain.set_gas_limit(0);
        let mut config = sample_evm_config();
        config.gas_limit_margin = 50_000;
        let writer = EvmWriter::new(&config, BRIDGE_ADDRESS, chain).unwrap();

        let quote = writer.quote_gas().await.unwrap();
        assert_eq!(quote.gas_limit, 50_000);
    }

    #[tokio::test]
    async fn test_bad_payment_id_is_rejected_without_submission() {
        let chain = Arc::new(MockEvm::new());
        let writer = EvmWriter::new(&sample_evm_config(), BRIDGE_ADDRESS, chain.clone()).unwrap();

        let delivery = writer
            .mint(&deposit(Some("zz".repeat(32)), 500))
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Rejected { .. }));

        let delivery = writer.mint(&deposit(None, 500)).await.unwrap();
        assert!(matches!(delivery, Delivery::Rejected { .. }));

        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_receipt_times_out() {
        let chain = Arc::new(MockEvm::new());
        chain.set_stall_receipts(true);
        let mut config = sample_evm_config();
        config.receipt_timeout_ms = 60_000;
        let writer = EvmWriter::new(&config, BRIDGE_ADDRESS, chain.clone()).unwrap();

        let payment_id = eth_to_payment_id(RECIPIENT).unwrap();
        let err = writer
            .mint(&deposit(Some(payment_id), 500))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(chain.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_transient() {
        let chain = Arc::new(MockEvm::new());
        chain.set_fail_sends(true);
        let writer = EvmWriter::new(&sample_evm_config(), BRIDGE_ADDRESS, chain).unwrap();

        let payment_id = eth_to_payment_id(RECIPIENT).unwrap();
        assert!(writer.mint(&deposit(Some(payment_id), 500)).await.is_err());
    }
}
