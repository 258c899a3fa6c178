//! Talleo Writer - pays out TLO for confirmed `ConversionTo` events
//!
//! The payout is the converted amount minus the network fee, sent from the
//! bridge wallet with the configured ring size.

use std::sync::Arc;

use eyre::{eyre, Result};
use tracing::{error, info};

use crate::config::TalleoConfig;
use crate::talleo_client::{SendTransactionRequest, TalleoRpc, WalletTransfer};
use crate::types::{format_amount, PendingTransfer};
use crate::writers::Delivery;

pub struct TalleoWriter {
    rpc: Arc<dyn TalleoRpc>,
    fee: u64,
    anonymity: u32,
}

impl TalleoWriter {
    pub fn new(config: &TalleoConfig, rpc: Arc<dyn TalleoRpc>) -> Self {
        Self {
            rpc,
            fee: config.fee,
            anonymity: config.anonymity,
        }
    }

    pub async fn pay_out(&self, transfer: &PendingTransfer) -> Result<Delivery> {
        let Some(address) = transfer.to_address.clone().filter(|a| !a.is_empty()) else {
            return Ok(Delivery::Rejected {
                reason: "conversion carries no Talleo address".to_string(),
            });
        };

        let amount = transfer.amount.saturating_sub(self.fee);
        info!(
            tx_hash = %transfer.source_tx_hash,
            to = %address,
            amount = %format_amount(amount),
            fee = %format_amount(self.fee),
            "Sending TLO"
        );

        let request = SendTransactionRequest {
            transfers: vec![WalletTransfer { amount, address }],
            fee: self.fee,
            anonymity: self.anonymity,
        };

        match self.rpc.send_transaction(&request).await {
            Ok(tx_hash) => {
                info!(
                    source_tx_hash = %transfer.source_tx_hash,
                    tx_hash = %tx_hash,
                    "Sent TLO"
                );
                Ok(Delivery::Sent { tx_hash })
            }
            Err(e) if e.is_permanent() => {
                error!(
                    tx_hash = %transfer.source_tx_hash,
                    to = ?transfer.to_address,
                    error = %e,
                    "Invalid address"
                );
                Ok(Delivery::Rejected {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(eyre!("Failed to send TLO: {}", e)),
        }
    }
}
