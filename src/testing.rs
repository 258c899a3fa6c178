//! In-process stand-ins for the Ethereum node and the Talleo wallet

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use eyre::{eyre, Result};

use crate::config::{EvmConfig, TalleoConfig};
use crate::evm_client::EvmChain;
use crate::talleo_client::{SendTransactionRequest, TalleoRpc, TalleoTransaction, WalletError};

pub const BRIDGE_ADDRESS: &str = "TA4yX9t4dz3C8W3z2u3Wc5hS1WkV4c6aQ9";

pub fn sample_evm_config() -> EvmConfig {
    EvmConfig {
        rpc_url: "http://localhost:8545".to_string(),
        ws_url: "ws://localhost:8546".to_string(),
        chain_id: 31337,
        contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
        private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .to_string(),
        confirmations: 10,
        start_height: 0,
        gas: 120_000,
        gas_limit_margin: 1_000_000,
        log_range: 5_000,
        receipt_timeout_ms: 300_000,
    }
}

pub fn sample_talleo_config() -> TalleoConfig {
    TalleoConfig {
        daemon_url: "http://localhost:11811".to_string(),
        wallet_url: "http://localhost:8070".to_string(),
        wallet_password: None,
        bridge_address: BRIDGE_ADDRESS.to_string(),
        confirmations: 10,
        start_height: 0,
        fee: 1,
        anonymity: 3,
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MockEvm {
    head: AtomicU64,
    gas_limit: AtomicU64,
    tx_blocks: Mutex<HashMap<String, u64>>,
    sent: Mutex<Vec<Bytes>>,
    fail_sends: AtomicBool,
    fail_reads: AtomicBool,
    stall_receipts: AtomicBool,
}

impl MockEvm {
    pub fn new() -> Self {
        Self {
            head: AtomicU64::new(0),
            gas_limit: AtomicU64::new(30_000_000),
            tx_blocks: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            stall_receipts: AtomicBool::new(false),
        }
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    pub fn set_gas_limit(&self, gas_limit: u64) {
        self.gas_limit.store(gas_limit, Ordering::SeqCst);
    }

    pub fn include(&self, tx_hash: &str, block: u64) {
        lock(&self.tx_blocks).insert(tx_hash.to_string(), block);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Broadcasts succeed but no receipt ever arrives
    pub fn set_stall_receipts(&self, stall: bool) {
        self.stall_receipts.store(stall, Ordering::SeqCst);
    }

    pub fn sent_transactions(&self) -> Vec<Bytes> {
        lock(&self.sent).clone()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(eyre!("node unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EvmChain for MockEvm {
    async fn block_number(&self) -> Result<u64> {
        self.check_reads()?;
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn transaction_block(&self, tx_hash: &str) -> Result<Option<u64>> {
        self.check_reads()?;
        Ok(lock(&self.tx_blocks).get(tx_hash).copied())
    }

    async fn latest_gas_limit(&self) -> Result<u64> {
        Ok(self.gas_limit.load(Ordering::SeqCst))
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(1_000_000_000)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64> {
        Ok(lock(&self.sent).len() as u64)
    }

    async fn send_raw_and_wait(&self, raw: Bytes) -> Result<String> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(eyre!("Failed to send transaction: connection refused"));
        }
        let count = {
            let mut sent = lock(&self.sent);
            sent.push(raw);
            sent.len()
        };
        if self.stall_receipts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(format!("0x{:064x}", count))
    }
}

pub struct MockTalleo {
    height: AtomicU64,
    fail_height: AtomicBool,
    fail_hashes: AtomicBool,
    /// (block, hash) pairs the bridge address received
    deposits: Mutex<Vec<(u64, String)>>,
    transactions: Mutex<HashMap<String, TalleoTransaction>>,
    hash_requests: Mutex<Vec<(u64, u64)>>,
    sent: Mutex<Vec<SendTransactionRequest>>,
    send_error: Mutex<Option<fn() -> WalletError>>,
}

impl MockTalleo {
    pub fn new() -> Self {
        Self {
            height: AtomicU64::new(0),
            fail_height: AtomicBool::new(false),
            fail_hashes: AtomicBool::new(false),
            deposits: Mutex::new(Vec::new()),
            transactions: Mutex::new(HashMap::new()),
            hash_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_fail_height(&self, fail: bool) {
        self.fail_height.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_hashes(&self, fail: bool) {
        self.fail_hashes.store(fail, Ordering::SeqCst);
    }

    /// Register a deposit to the bridge address
    pub fn deposit(&self, hash: &str, amount: i64, block_index: u32, payment_id: &str) {
        lock(&self.deposits).push((block_index as u64, hash.to_string()));
        lock(&self.transactions).insert(
            hash.to_string(),
            TalleoTransaction {
                transaction_hash: hash.to_string(),
                amount,
                block_index,
                payment_id: payment_id.to_string(),
            },
        );
    }

    pub fn fail_sends_with(&self, error: fn() -> WalletError) {
        *lock(&self.send_error) = Some(error);
    }

    pub fn sent_requests(&self) -> Vec<SendTransactionRequest> {
        lock(&self.sent).clone()
    }

    /// `(first_block, block_count)` of every history request
    pub fn hash_requests(&self) -> Vec<(u64, u64)> {
        lock(&self.hash_requests).clone()
    }
}

#[async_trait]
impl TalleoRpc for MockTalleo {
    async fn network_height(&self) -> Result<u64> {
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(eyre!("daemon unavailable"));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn transaction_hashes(
        &self,
        _addresses: &[String],
        first_block: u64,
        block_count: u64,
    ) -> Result<Vec<String>> {
        lock(&self.hash_requests).push((first_block, block_count));
        if self.fail_hashes.load(Ordering::SeqCst) {
            return Err(eyre!("getTransactionHashes failed: wallet busy"));
        }
        let end = first_block + block_count;
        Ok(lock(&self.deposits)
            .iter()
            .filter(|(block, _)| *block >= first_block && *block < end)
            .map(|(_, hash)| hash.clone())
            .collect())
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TalleoTransaction> {
        lock(&self.transactions)
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| eyre!("getTransaction {} failed: not found", tx_hash))
    }

    async fn send_transaction(
        &self,
        request: &SendTransactionRequest,
    ) -> std::result::Result<String, WalletError> {
        if let Some(error) = *lock(&self.send_error) {
            return Err(error());
        }
        let mut sent = lock(&self.sent);
        sent.push(request.clone());
        Ok(format!("{:064x}", sent.len()))
    }
}
