//! Talleo daemon and wallet RPC client
//!
//! Talleo exposes no event subscription. The bridge reads network height from
//! the daemon's `/getheight` endpoint and everything else through the
//! wallet's JSON-RPC interface (`/json_rpc`).

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Block index the wallet reports for transactions not yet in a block
pub const UNCONFIRMED_BLOCK_INDEX: u32 = u32::MAX;

/// Message the wallet returns for an unparseable destination address
const BAD_ADDRESS_MESSAGE: &str = "Bad address";

#[derive(Debug, Error)]
pub enum WalletError {
    /// Destination rejected by the wallet; retrying cannot succeed
    #[error("Bad address")]
    BadAddress,

    #[error("wallet RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected wallet response: {0}")]
    UnexpectedResponse(String),

    #[error("wallet request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl WalletError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, WalletError::BadAddress)
    }
}

/// A single payout of a `sendTransaction` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletTransfer {
    pub amount: u64,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendTransactionRequest {
    pub transfers: Vec<WalletTransfer>,
    pub fee: u64,
    pub anonymity: u32,
}

/// The wallet's view of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalleoTransaction {
    #[serde(default)]
    pub transaction_hash: String,
    /// Net effect on the wallet, in minor units
    pub amount: i64,
    pub block_index: u32,
    #[serde(default)]
    pub payment_id: String,
}

impl TalleoTransaction {
    /// Height of the containing block, or None while unconfirmed
    pub fn block_height(&self) -> Option<u64> {
        match self.block_index {
            0 | UNCONFIRMED_BLOCK_INDEX => None,
            index => Some(index as u64),
        }
    }

    /// Amount received, zero for outgoing transactions
    pub fn received_amount(&self) -> u64 {
        self.amount.max(0) as u64
    }
}

/// Operations the bridge needs from Talleo
#[async_trait]
pub trait TalleoRpc: Send + Sync {
    async fn network_height(&self) -> Result<u64>;

    /// Hashes of transactions touching `addresses` in
    /// `[first_block, first_block + block_count)`
    async fn transaction_hashes(
        &self,
        addresses: &[String],
        first_block: u64,
        block_count: u64,
    ) -> Result<Vec<String>>;

    async fn get_transaction(&self, tx_hash: &str) -> Result<TalleoTransaction>;

    /// Submit a payout and return its transaction hash
    async fn send_transaction(
        &self,
        request: &SendTransactionRequest,
    ) -> std::result::Result<String, WalletError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    network_height: u64,
}

#[derive(Debug, Deserialize)]
struct TransactionHashesResult {
    #[serde(default)]
    items: Vec<BlockHashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHashes {
    #[serde(default)]
    transaction_hashes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GetTransactionResult {
    transaction: TalleoTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionResult {
    #[serde(default)]
    transaction_hash: Option<String>,
}

/// HTTP client for a Talleo daemon and wallet pair
pub struct TalleoClient {
    client: Client,
    daemon_url: String,
    wallet_url: String,
    wallet_password: Option<String>,
}

impl TalleoClient {
    pub fn new(config: &crate::config::TalleoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build HTTP client")?;

        Ok(Self {
            client,
            daemon_url: config.daemon_url.trim_end_matches('/').to_string(),
            wallet_url: config.wallet_url.trim_end_matches('/').to_string(),
            wallet_password: config.wallet_password.clone(),
        })
    }

    fn wallet_body(&self, method: &str, params: Value) -> Value {
        let mut body = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
            "params": params,
        });
        if let Some(password) = &self.wallet_password {
            body["password"] = json!(password);
        }
        body
    }

    /// Call a wallet method, keeping the RPC error separate from transport
    /// and decoding failures
    async fn wallet_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<T, WalletError> {
        debug!(method, "Talleo wallet RPC call");
        let response = self
            .client
            .post(format!("{}/json_rpc", self.wallet_url))
            .json(&self.wallet_body(method, params))
            .send()
            .await?
            .json::<RpcResponse<T>>()
            .await?;

        if let Some(error) = response.error {
            if error.message == BAD_ADDRESS_MESSAGE {
                return Err(WalletError::BadAddress);
            }
            return Err(WalletError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| WalletError::UnexpectedResponse(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl TalleoRpc for TalleoClient {
    async fn network_height(&self) -> Result<u64> {
        let response: HeightResponse = self
            .client
            .post(format!("{}/getheight", self.daemon_url))
            .json(&json!({}))
            .send()
            .await
            .wrap_err("Failed to query Talleo height")?
            .json()
            .await
            .wrap_err("Failed to parse Talleo height response")?;

        Ok(response.network_height)
    }

    async fn transaction_hashes(
        &self,
        addresses: &[String],
        first_block: u64,
        block_count: u64,
    ) -> Result<Vec<String>> {
        let result: TransactionHashesResult = self
            .wallet_call(
                "getTransactionHashes",
                json!({
                    "addresses": addresses,
                    "firstBlockIndex": first_block,
                    "blockCount": block_count,
                }),
            )
            .await
            .map_err(|e| eyre!("getTransactionHashes failed: {}", e))?;

        Ok(result
            .items
            .into_iter()
            .flat_map(|block| block.transaction_hashes)
            .collect())
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TalleoTransaction> {
        let result: GetTransactionResult = self
            .wallet_call("getTransaction", json!({ "transactionHash": tx_hash }))
            .await
            .map_err(|e| eyre!("getTransaction {} failed: {}", tx_hash, e))?;

        Ok(result.transaction)
    }

    async fn send_transaction(
        &self,
        request: &SendTransactionRequest,
    ) -> std::result::Result<String, WalletError> {
        let params = serde_json::to_value(request)
            .map_err(|e| WalletError::UnexpectedResponse(e.to_string()))?;
        let result: SendTransactionResult = self.wallet_call("sendTransaction", params).await?;

        match result.transaction_hash {
            Some(hash) if !hash.is_empty() => Ok(hash),
            _ => Err(WalletError::UnexpectedResponse(
                "sendTransaction returned no transaction hash".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_height() {
        let mut tx = TalleoTransaction {
            transaction_hash: "aa".to_string(),
            amount: 500,
            block_index: 1200,
            payment_id: String::new(),
        };
        assert_eq!(tx.block_height(), Some(1200));

        tx.block_index = UNCONFIRMED_BLOCK_INDEX;
        assert_eq!(tx.block_height(), None);

        tx.block_index = 0;
        assert_eq!(tx.block_height(), None);
    }

    #[test]
    fn test_received_amount_ignores_outgoing() {
        let tx = TalleoTransaction {
            transaction_hash: "aa".to_string(),
            amount: -300,
            block_index: 5,
            payment_id: String::new(),
        };
        assert_eq!(tx.received_amount(), 0);
    }

    #[test]
    fn test_parse_get_transaction() {
        let raw = r#"{"jsonrpc":"2.0","id":"0","result":{"transaction":{
            "transactionHash":"ab12","amount":2500,"blockIndex":4000,
            "paymentId":"00ff","fee":1,"unlockTime":0}}}"#;
        let parsed: RpcResponse<GetTransactionResult> = serde_json::from_str(raw).unwrap();
        let tx = parsed.result.unwrap().transaction;
        assert_eq!(tx.amount, 2500);
        assert_eq!(tx.block_index, 4000);
        assert_eq!(tx.payment_id, "00ff");
    }

    #[test]
    fn test_parse_transaction_hashes() {
        let raw = r#"{"result":{"items":[
            {"blockHash":"b1","transactionHashes":["t1","t2"]},
            {"blockHash":"b2","transactionHashes":[]},
            {"blockHash":"b3","transactionHashes":["t3"]}]}}"#;
        let parsed: RpcResponse<TransactionHashesResult> = serde_json::from_str(raw).unwrap();
        let hashes: Vec<String> = parsed
            .result
            .unwrap()
            .items
            .into_iter()
            .flat_map(|b| b.transaction_hashes)
            .collect();
        assert_eq!(hashes, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_parse_rpc_error() {
        let raw = r#"{"error":{"code":-32000,"message":"Bad address"}}"#;
        let parsed: RpcResponse<SendTransactionResult> = serde_json::from_str(raw).unwrap();
        let error = parsed.error.unwrap();
        assert_eq!(error.message, BAD_ADDRESS_MESSAGE);
        assert!(WalletError::BadAddress.is_permanent());
        assert!(!WalletError::UnexpectedResponse("x".to_string()).is_permanent());
    }

    #[test]
    fn test_send_request_shape() {
        let request = SendTransactionRequest {
            transfers: vec![WalletTransfer {
                amount: 499,
                address: "TA1".to_string(),
            }],
            fee: 1,
            anonymity: 3,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["transfers"][0]["amount"], 499);
        assert_eq!(value["transfers"][0]["address"], "TA1");
        assert_eq!(value["fee"], 1);
        assert_eq!(value["anonymity"], 3);
    }
}
