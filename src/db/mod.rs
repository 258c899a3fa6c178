//! Durable bridge state: per-chain cursors and completion markers.
//!
//! The [`CursorStore`] trait is the seam the watchers and the relay writers
//! use. [`PgStore`] backs it with Postgres; unit tests use a process-local
//! store from the `memory` module.

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::types::Chain;

#[cfg(test)]
pub(crate) mod memory;
pub mod models;

#[cfg(test)]
pub(crate) use memory::MemoryStore;
pub use models::*;

/// Value stored in a completion marker while a relay is in flight
pub const CLAIM_PLACEHOLDER: &str = "claimed";

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last block durably progressed past on `chain`
    async fn last_block(&self, chain: Chain) -> Result<Option<u64>>;

    /// Persist the cursor. Implementations never move it backwards.
    async fn set_last_block(&self, chain: Chain, block: u64) -> Result<()>;

    /// Destination hash recorded for `source_tx_hash`, if it was relayed
    async fn completion(&self, chain: Chain, source_tx_hash: &str) -> Result<Option<String>>;

    /// Record that `source_tx_hash` was relayed as `dest_tx_hash`
    async fn set_completion(
        &self,
        chain: Chain,
        source_tx_hash: &str,
        dest_tx_hash: &str,
    ) -> Result<()>;

    /// Insert a placeholder marker if none exists. Returns false when a
    /// marker (real or placeholder) is already present.
    async fn claim_completion(&self, chain: Chain, source_tx_hash: &str) -> Result<bool>;

    /// Remove a placeholder left by [`CursorStore::claim_completion`].
    /// Real markers are left untouched.
    async fn release_claim(&self, chain: Chain, source_tx_hash: &str) -> Result<()>;
}

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All cursors, for the status endpoint
    pub async fn cursors(&self) -> Result<Vec<CursorRow>> {
        sqlx::query_as::<_, CursorRow>(
            r#"SELECT chain, last_block, updated_at FROM bridge_cursors ORDER BY chain"#,
        )
        .fetch_all(&self.pool)
        .await
        .wrap_err("Failed to list cursors")
    }

    /// Most recent completion markers for a chain
    pub async fn recent_conversions(&self, chain: Chain, limit: i64) -> Result<Vec<ConversionRow>> {
        sqlx::query_as::<_, ConversionRow>(
            r#"SELECT chain, source_tx_hash, dest_tx_hash, created_at
               FROM bridge_conversions
               WHERE chain = $1 AND dest_tx_hash <> $2
               ORDER BY created_at DESC
               LIMIT $3"#,
        )
        .bind(chain)
        .bind(CLAIM_PLACEHOLDER)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .wrap_err("Failed to list conversions")
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn last_block(&self, chain: Chain) -> Result<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as(r#"SELECT last_block FROM bridge_cursors WHERE chain = $1"#)
                .bind(chain)
                .fetch_optional(&self.pool)
                .await
                .wrap_err_with(|| format!("Failed to get last block for {}", chain))?;

        Ok(row.map(|r| r.0.max(0) as u64))
    }

    async fn set_last_block(&self, chain: Chain, block: u64) -> Result<()> {
        let block = i64::try_from(block).wrap_err("Block number out of range")?;
        sqlx::query(
            r#"
            INSERT INTO bridge_cursors (chain, last_block)
            VALUES ($1, $2)
            ON CONFLICT (chain) DO UPDATE
                SET last_block = GREATEST(bridge_cursors.last_block, EXCLUDED.last_block),
                    updated_at = NOW()
            "#,
        )
        .bind(chain)
        .bind(block)
        .execute(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to update last block for {}", chain))?;

        Ok(())
    }

    async fn completion(&self, chain: Chain, source_tx_hash: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT dest_tx_hash FROM bridge_conversions WHERE chain = $1 AND source_tx_hash = $2"#,
        )
        .bind(chain)
        .bind(source_tx_hash)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("Failed to get completion marker")?;

        Ok(row.map(|r| r.0))
    }

    async fn set_completion(
        &self,
        chain: Chain,
        source_tx_hash: &str,
        dest_tx_hash: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bridge_conversions (chain, source_tx_hash, dest_tx_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain, source_tx_hash) DO UPDATE
                SET dest_tx_hash = EXCLUDED.dest_tx_hash, updated_at = NOW()
            "#,
        )
        .bind(chain)
        .bind(source_tx_hash)
        .bind(dest_tx_hash)
        .execute(&self.pool)
        .await
        .wrap_err("Failed to store completion marker")?;

        Ok(())
    }

    async fn claim_completion(&self, chain: Chain, source_tx_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO bridge_conversions (chain, source_tx_hash, dest_tx_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain, source_tx_hash) DO NOTHING
            "#,
        )
        .bind(chain)
        .bind(source_tx_hash)
        .bind(CLAIM_PLACEHOLDER)
        .execute(&self.pool)
        .await
        .wrap_err("Failed to claim completion marker")?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, chain: Chain, source_tx_hash: &str) -> Result<()> {
        sqlx::query(
            r#"DELETE FROM bridge_conversions
               WHERE chain = $1 AND source_tx_hash = $2 AND dest_tx_hash = $3"#,
        )
        .bind(chain)
        .bind(source_tx_hash)
        .bind(CLAIM_PLACEHOLDER)
        .execute(&self.pool)
        .await
        .wrap_err("Failed to release completion claim")?;

        Ok(())
    }
}
