use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{CursorStore, CLAIM_PLACEHOLDER};
use crate::types::Chain;

/// Process-local [`CursorStore`].
///
/// Cloning the inner maps via [`MemoryStore::snapshot`] simulates a restart
/// against the same durable state.
#[derive(Default)]
pub struct MemoryStore {
    cursors: Mutex<HashMap<Chain, u64>>,
    markers: Mutex<HashMap<(Chain, String), String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise persistence errors
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of the durable state as a fresh store
    pub fn snapshot(&self) -> MemoryStore {
        MemoryStore {
            cursors: Mutex::new(lock(&self.cursors).clone()),
            markers: Mutex::new(lock(&self.markers).clone()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn marker_count(&self) -> usize {
        lock(&self.markers).len()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(eyre!("store is read-only"));
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn last_block(&self, chain: Chain) -> Result<Option<u64>> {
        Ok(lock(&self.cursors).get(&chain).copied())
    }

    async fn set_last_block(&self, chain: Chain, block: u64) -> Result<()> {
        self.check_writable()?;
        let mut cursors = lock(&self.cursors);
        let entry = cursors.entry(chain).or_insert(block);
        *entry = (*entry).max(block);
        Ok(())
    }

    async fn completion(&self, chain: Chain, source_tx_hash: &str) -> Result<Option<String>> {
        Ok(lock(&self.markers)
            .get(&(chain, source_tx_hash.to_string()))
            .cloned())
    }

    async fn set_completion(
        &self,
        chain: Chain,
        source_tx_hash: &str,
        dest_tx_hash: &str,
    ) -> Result<()> {
        self.check_writable()?;
        lock(&self.markers).insert(
            (chain, source_tx_hash.to_string()),
            dest_tx_hash.to_string(),
        );
        Ok(())
    }

    async fn claim_completion(&self, chain: Chain, source_tx_hash: &str) -> Result<bool> {
        self.check_writable()?;
        let mut markers = lock(&self.markers);
        let key = (chain, source_tx_hash.to_string());
        if markers.contains_key(&key) {
            return Ok(false);
        }
        markers.insert(key, CLAIM_PLACEHOLDER.to_string());
        Ok(true)
    }

    async fn release_claim(&self, chain: Chain, source_tx_hash: &str) -> Result<()> {
        self.check_writable()?;
        let mut markers = lock(&self.markers);
        let key = (chain, source_tx_hash.to_string());
        if markers.get(&key).map(String::as_str) == Some(CLAIM_PLACEHOLDER) {
            markers.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cursor_never_regresses() {
        let store = MemoryStore::new();
        assert_eq!(store.last_block(Chain::Talleo).await.unwrap(), None);

        store.set_last_block(Chain::Talleo, 50).await.unwrap();
        store.set_last_block(Chain::Talleo, 40).await.unwrap();
        assert_eq!(store.last_block(Chain::Talleo).await.unwrap(), Some(50));
        assert_eq!(store.last_block(Chain::Ethereum).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_claim_and_release() {
        let store = MemoryStore::new();
        assert!(store.claim_completion(Chain::Ethereum, "0x1").await.unwrap());
        assert!(!store.claim_completion(Chain::Ethereum, "0x1").await.unwrap());

        store.release_claim(Chain::Ethereum, "0x1").await.unwrap();
        assert_eq!(store.completion(Chain::Ethereum, "0x1").await.unwrap(), None);

        store.set_completion(Chain::Ethereum, "0x1", "tlo-hash").await.unwrap();
        // Releasing never removes a real marker
        store.release_claim(Chain::Ethereum, "0x1").await.unwrap();
        assert_eq!(
            store.completion(Chain::Ethereum, "0x1").await.unwrap().as_deref(),
            Some("tlo-hash")
        );
    }

    #[tokio::test]
    async fn test_failed_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.set_last_block(Chain::Ethereum, 1).await.is_err());
        assert!(store.set_completion(Chain::Ethereum, "a", "b").await.is_err());
        assert_eq!(store.marker_count(), 0);
    }
}
