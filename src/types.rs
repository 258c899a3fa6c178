//! Common types shared by the watchers, the confirmation tracker and the
//! relay writers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two ledgers the bridge connects.
///
/// The lowercase name doubles as the storage namespace for cursors and
/// completion markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Talleo,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Talleo => "talleo",
        }
    }

    /// The chain a transfer originating here is paid out on
    pub fn counterpart(&self) -> Chain {
        match self {
            Chain::Ethereum => Chain::Talleo,
            Chain::Talleo => Chain::Ethereum,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A conversion request observed on its origin chain and waiting for
/// confirmation depth.
///
/// Talleo transfers are discovered by hash only; `amount` and `to_address`
/// are filled in from the wallet's view of the transaction on each
/// confirmation poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransfer {
    pub origin: Chain,
    pub source_tx_hash: String,
    pub from_address: Option<String>,
    /// Destination in the counterpart chain's address form
    pub to_address: Option<String>,
    /// Raw payment id of a Talleo deposit, the encoded Ethereum destination
    pub payment_id: Option<String>,
    /// Minor units (1 TLO = 100)
    pub amount: u64,
    pub first_seen_block: u64,
}

impl PendingTransfer {
    /// Transfer seen as a `ConversionTo` event on Ethereum
    pub fn from_ethereum(
        source_tx_hash: String,
        from_address: String,
        to_address: String,
        amount: u64,
        block: u64,
    ) -> Self {
        Self {
            origin: Chain::Ethereum,
            source_tx_hash,
            from_address: Some(from_address),
            to_address: Some(to_address),
            payment_id: None,
            amount,
            first_seen_block: block,
        }
    }

    /// Transfer seen as a transaction hash to the bridge address on Talleo
    pub fn from_talleo(source_tx_hash: String, scanned_from_block: u64) -> Self {
        Self {
            origin: Chain::Talleo,
            source_tx_hash,
            from_address: None,
            to_address: None,
            payment_id: None,
            amount: 0,
            first_seen_block: scanned_from_block,
        }
    }

    pub fn key(&self) -> TransferKey {
        TransferKey {
            origin: self.origin,
            source_tx_hash: self.source_tx_hash.clone(),
        }
    }

    /// Re-derive the mutable fields from a later sighting; last value wins.
    pub fn refresh_from(&mut self, other: &PendingTransfer) {
        self.amount = other.amount;
        if other.to_address.is_some() {
            self.to_address = other.to_address.clone();
        }
        if other.payment_id.is_some() {
            self.payment_id = other.payment_id.clone();
        }
        if other.from_address.is_some() {
            self.from_address = other.from_address.clone();
        }
    }
}

/// Identity of a tracked transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub origin: Chain,
    pub source_tx_hash: String,
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.source_tx_hash)
    }
}

/// Lifecycle of a tracked transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Confirmed,
    Relayed,
    RelayError,
    InvalidDestination,
    AlreadyRelayed,
    BelowMinimum,
    Abandoned,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Confirmed => "confirmed",
            TransferState::Relayed => "relayed",
            TransferState::RelayError => "relay_error",
            TransferState::InvalidDestination => "invalid_destination",
            TransferState::AlreadyRelayed => "already_relayed",
            TransferState::BelowMinimum => "below_minimum",
            TransferState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            TransferState::Pending | TransferState::Confirmed | TransferState::RelayError
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format minor units as a whole-unit amount with two decimals.
pub fn format_amount(minor: u64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}
