use std::sync::Arc;

use tokio::sync::mpsc;

use tlo_bridge::api;
use tlo_bridge::config::Config;
use tlo_bridge::confirmation::{
    ConfirmationTracker, EvmConfirmation, TalleoConfirmation, TrackerSettings,
};
use tlo_bridge::db::{self, CursorStore, PgStore};
use tlo_bridge::evm_client::{EvmChain, EvmClient};
use tlo_bridge::state::Cursor;
use tlo_bridge::talleo_client::{TalleoClient, TalleoRpc};
use tlo_bridge::types::{Chain, PendingTransfer};
use tlo_bridge::watchers::{EvmWatcher, TalleoScanner, WatcherManager};
use tlo_bridge::writers::{EvmWriter, RelayExecutor, TalleoWriter};

/// Detected transfers waiting for the tracker
const TRANSFER_QUEUE: usize = 1024;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting TLO Bridge");

    let config = Config::load()?;
    tracing::info!(
        evm_chain_id = config.evm.chain_id,
        contract_address = %config.evm.contract_address,
        bridge_address = %config.talleo.bridge_address,
        evm_confirmations = config.evm.confirmations,
        talleo_confirmations = config.talleo.confirmations,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let pg_store = PgStore::new(pool);
    let store: Arc<dyn CursorStore> = Arc::new(pg_store.clone());

    let evm_cursor = Arc::new(Cursor::load(Chain::Ethereum, store.clone()).await);
    let talleo_cursor = Arc::new(Cursor::load(Chain::Talleo, store.clone()).await);

    let evm: Arc<dyn EvmChain> = Arc::new(EvmClient::new(&config.evm.rpc_url)?);
    let talleo: Arc<dyn TalleoRpc> = Arc::new(TalleoClient::new(&config.talleo)?);

    let executor = Arc::new(RelayExecutor::new(
        store.clone(),
        TalleoWriter::new(&config.talleo, talleo.clone()),
        EvmWriter::new(&config.evm, &config.talleo.bridge_address, evm.clone())?,
        config.relay.min_amount,
        config.relay.claim_markers,
    ));

    let tracker = ConfirmationTracker::new(
        TrackerSettings::from_config(&config),
        Arc::new(EvmConfirmation::new(evm)),
        Arc::new(TalleoConfirmation::new(talleo.clone(), talleo_cursor.clone())),
        executor,
    );

    let (transfer_tx, transfer_rx) = mpsc::channel::<PendingTransfer>(TRANSFER_QUEUE);
    let watcher_manager = WatcherManager::new(
        EvmWatcher::new(&config.evm, evm_cursor, transfer_tx.clone())?,
        TalleoScanner::new(
            &config.talleo,
            config.scanner.clone(),
            talleo,
            talleo_cursor,
            transfer_tx,
        ),
    );

    // Create shutdown channels
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx2, shutdown_rx2) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
        let _ = shutdown_tx2.send(()).await;
    });

    tracing::info!("Managers initialized, starting processing");

    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_addr, pg_store).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // A fatal watcher error (no safe Talleo starting point) ends the process
    let result = tokio::select! {
        result = watcher_manager.run(shutdown_rx) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "Watcher manager error");
            }
            result
        }
        result = tracker.run(transfer_rx, shutdown_rx2) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "Confirmation tracker error");
            }
            result
        }
    };

    tlo_bridge::metrics::UP.set(0.0);
    tracing::info!("TLO Bridge stopped");
    result
}

/// Initialize tracing/logging with structured output.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tlo_bridge=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
