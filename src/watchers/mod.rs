use eyre::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

pub mod evm;
pub mod talleo;

pub use evm::EvmWatcher;
pub use talleo::TalleoScanner;

/// Runs the Ethereum ingestor and the Talleo scanner side by side
pub struct WatcherManager {
    evm_watcher: EvmWatcher,
    talleo_scanner: TalleoScanner,
}

impl WatcherManager {
    pub fn new(evm_watcher: EvmWatcher, talleo_scanner: TalleoScanner) -> Self {
        Self {
            evm_watcher,
            talleo_scanner,
        }
    }

    /// Run all watchers concurrently
    /// Returns when any watcher fails or shutdown signal received
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        let evm_watcher = self.evm_watcher;
        join_set.spawn(async move { evm_watcher.run().await });
        join_set.spawn(self.talleo_scanner.run());

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping watchers");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A watcher exited unexpectedly without error");
                        Err(eyre::eyre!("watcher exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A watcher stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A watcher task panicked: {:?}", e);
                        Err(eyre::eyre!("watcher task panicked: {}", e))
                    }
                    None => {
                        error!("All watcher tasks exited unexpectedly");
                        Err(eyre::eyre!("all watcher tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
