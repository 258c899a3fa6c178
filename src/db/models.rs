use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::types::Chain;

/// Persisted scan cursor for one chain
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CursorRow {
    pub chain: Chain,
    pub last_block: i64,
    pub updated_at: DateTime<Utc>,
}

/// Completion marker linking a source transaction to its payout
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversionRow {
    pub chain: Chain,
    pub source_tx_hash: String,
    pub dest_tx_hash: String,
    pub created_at: DateTime<Utc>,
}
