//! EVM Watcher - ingests `ConversionTo` events from the WTLO contract
//!
//! On every (re)connection the watcher first backfills with `eth_getLogs`
//! from the block after the cursor up to the head, then follows new events
//! over a websocket subscription. The subscription is opened before the
//! backfill so nothing mined in between is missed; events seen twice are
//! deduplicated by the confirmation tracker.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use eyre::{eyre, Result, WrapErr};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::address_codec::talleo_address_from_bytes;
use crate::config::EvmConfig;
use crate::contracts::WrappedTalleo;
use crate::metrics;
use crate::state::Cursor;
use crate::types::{format_amount, Chain, PendingTransfer};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// A decoded `ConversionTo` event with the block it was mined in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub transfer: PendingTransfer,
    pub block: Option<u64>,
}

/// Decode a `ConversionTo` log. Returns None for logs that cannot describe a
/// payable conversion.
pub fn parse_conversion_log(log: &Log) -> Result<Option<Conversion>> {
    if log.removed {
        tracing::warn!(tx_hash = ?log.transaction_hash, "Ignoring removed log");
        return Ok(None);
    }

    let Some(tx_hash) = log.transaction_hash else {
        return Ok(None);
    };

    let decoded = log
        .log_decode::<WrappedTalleo::ConversionTo>()
        .map_err(|e| eyre!("Failed to decode ConversionTo: {}", e))?;
    let event = &decoded.inner.data;

    let amount = match u64::try_from(event.value) {
        Ok(amount) => amount,
        Err(_) => {
            tracing::error!(
                tx_hash = %tx_hash,
                value = %event.value,
                "ConversionTo amount does not fit in TLO units"
            );
            return Ok(None);
        }
    };

    let block = log.block_number;
    let transfer = PendingTransfer::from_ethereum(
        format!("0x{:x}", tx_hash),
        format!("{}", event.from),
        talleo_address_from_bytes(&event.to),
        amount,
        block.unwrap_or(0),
    );

    Ok(Some(Conversion { transfer, block }))
}

/// EVM event watcher for ConversionTo events
pub struct EvmWatcher {
    ws_url: String,
    contract_address: Address,
    start_height: u64,
    log_range: u64,
    cursor: Arc<Cursor>,
    sink: mpsc::Sender<PendingTransfer>,
}

impl EvmWatcher {
    pub fn new(
        config: &EvmConfig,
        cursor: Arc<Cursor>,
        sink: mpsc::Sender<PendingTransfer>,
    ) -> Result<Self> {
        let contract_address = Address::from_str(&config.contract_address)
            .wrap_err("Invalid contract address")?;

        Ok(Self {
            ws_url: config.ws_url.clone(),
            contract_address,
            start_height: config.start_height,
            log_range: config.log_range.max(1),
            cursor,
            sink,
        })
    }

    /// Run the watcher loop. Only returns once the tracker has gone away.
    pub async fn run(&self) -> Result<()> {
        let mut from_block = self.cursor.start_block(self.start_height).await;
        loop {
            tracing::info!(from_block, "Watching ConversionTo events");

            if let Err(e) = self.follow(from_block).await {
                if self.sink.is_closed() {
                    return Err(e.wrap_err("Confirmation tracker stopped"));
                }
                tracing::error!(error = %e, "Error while subscribing to ConversionTo");
                metrics::record_error(Chain::Ethereum.as_str(), "subscription");
            }

            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
            from_block = self.resubscribe_block().await;
        }
    }

    /// Later logs of the cursor block may not have arrived before the stream
    /// dropped, so that block is read again. Duplicates are dropped by the
    /// tracker and the completion markers.
    async fn resubscribe_block(&self) -> u64 {
        self.cursor.resume_block(self.start_height).await
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.contract_address)
            .event_signature(WrappedTalleo::ConversionTo::SIGNATURE_HASH)
    }

    async fn follow(&self, from_block: u64) -> Result<()> {
        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(self.ws_url.clone()))
            .await
            .wrap_err("Failed to connect to websocket")?;

        let subscription = provider
            .subscribe_logs(&self.filter())
            .await
            .wrap_err("Failed to subscribe to logs")?;

        let head = provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")?;

        let mut from = from_block;
        while from <= head {
            let to = (from + self.log_range - 1).min(head);
            tracing::debug!(from_block = from, to_block = to, "Backfilling ConversionTo");

            let logs = provider
                .get_logs(&self.filter().from_block(from).to_block(to))
                .await
                .wrap_err("Failed to get logs")?;
            for log in &logs {
                self.ingest(log).await?;
            }
            from = to + 1;
        }

        let mut stream = subscription.into_stream();
        while let Some(log) = stream.next().await {
            self.ingest(&log).await?;
        }

        Err(eyre!("ConversionTo subscription closed"))
    }

    /// Persist the event's block, then hand the transfer to the tracker
    async fn ingest(&self, log: &Log) -> Result<()> {
        let conversion = match parse_conversion_log(log) {
            Ok(Some(conversion)) => conversion,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::error!(
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    error = %e,
                    "Failed to parse ConversionTo log"
                );
                return Ok(());
            }
        };

        let transfer = conversion.transfer;
        tracing::info!(
            tx_hash = %transfer.source_tx_hash,
            from = ?transfer.from_address,
            to = ?transfer.to_address,
            amount = %format_amount(transfer.amount),
            block = ?conversion.block,
            "New ConversionTo detected"
        );

        if let Some(block) = conversion.block {
            self.cursor.advance(block).await;
        }
        metrics::record_transfer_detected(Chain::Ethereum.as_str());

        self.sink
            .send(transfer)
            .await
            .map_err(|_| eyre!("Confirmation tracker is not accepting transfers"))
    }
}
