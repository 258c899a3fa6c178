use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::address_codec::{is_valid_evm_address, talleo_address_to_bytes};

/// Main configuration for the bridge
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub evm: EvmConfig,
    pub talleo: TalleoConfig,
    pub relay: RelayConfig,
    pub scanner: ScannerConfig,
    pub api_port: u16,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Ethereum side: WTLO contract and the owner key that mints on conversion
#[derive(Clone)]
pub struct EvmConfig {
    /// HTTP endpoint for reads and transaction submission
    pub rpc_url: String,
    /// Websocket endpoint for the `ConversionTo` subscription
    pub ws_url: String,
    pub chain_id: u64,
    pub contract_address: String,
    pub private_key: String,
    pub confirmations: u64,
    pub start_height: u64,
    /// Gas limit for `convertFrom`
    pub gas: u64,
    /// Head-room over the latest block gas limit the tx gas may not exceed
    pub gas_limit_margin: u64,
    /// Block range per `eth_getLogs` call while backfilling
    pub log_range: u64,
    /// How long a broadcast `convertFrom` may wait for its receipt
    pub receipt_timeout_ms: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for EvmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmConfig")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("chain_id", &self.chain_id)
            .field("contract_address", &self.contract_address)
            .field("private_key", &"<redacted>")
            .field("confirmations", &self.confirmations)
            .field("start_height", &self.start_height)
            .field("gas", &self.gas)
            .field("gas_limit_margin", &self.gas_limit_margin)
            .field("log_range", &self.log_range)
            .field("receipt_timeout_ms", &self.receipt_timeout_ms)
            .finish()
    }
}

/// Talleo side: daemon, wallet RPC and the bridge's receiving address
#[derive(Clone)]
pub struct TalleoConfig {
    pub daemon_url: String,
    pub wallet_url: String,
    pub wallet_password: Option<String>,
    pub bridge_address: String,
    pub confirmations: u64,
    pub start_height: u64,
    /// Network fee deducted from Ethereum → Talleo payouts (minor units)
    pub fee: u64,
    pub anonymity: u32,
}

/// Custom Debug that redacts the wallet password.
impl fmt::Debug for TalleoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TalleoConfig")
            .field("daemon_url", &self.daemon_url)
            .field("wallet_url", &self.wallet_url)
            .field(
                "wallet_password",
                &self.wallet_password.as_ref().map(|_| "<redacted>"),
            )
            .field("bridge_address", &self.bridge_address)
            .field("confirmations", &self.confirmations)
            .field("start_height", &self.start_height)
            .field("fee", &self.fee)
            .field("anonymity", &self.anonymity)
            .finish()
    }
}

/// Confirmation polling and relay behaviour
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
    /// Transfers of this many minor units or fewer are dropped
    pub min_amount: u64,
    /// Give up after this many confirm-and-relay cycles (unbounded when None)
    pub max_attempts: Option<u32>,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Claim the completion marker before paying out
    pub claim_markers: bool,
}

/// Talleo history scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub interval_ms: u64,
    pub batch_size: u64,
    pub safety_lag: u64,
}

impl ScannerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Default functions
fn default_confirmations() -> u64 {
    10
}

fn default_gas() -> u64 {
    120_000
}

fn default_gas_limit_margin() -> u64 {
    1_000_000
}

fn default_log_range() -> u64 {
    5_000
}

fn default_receipt_timeout() -> u64 {
    300_000
}

fn default_fee() -> u64 {
    1
}

fn default_anonymity() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    30_000
}

fn default_min_amount() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_backoff() -> u64 {
    600_000
}

fn default_scan_interval() -> u64 {
    1_000
}

fn default_scan_batch_size() -> u64 {
    1_000
}

fn default_safety_lag() -> u64 {
    3
}

fn default_api_port() -> u16 {
    9090
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

fn optional<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
        };

        let evm = EvmConfig {
            rpc_url: required("EVM_RPC_URL")?,
            ws_url: required("EVM_WS_URL")?,
            chain_id: required("EVM_CHAIN_ID")?
                .parse()
                .wrap_err("EVM_CHAIN_ID must be a valid u64")?,
            contract_address: required("EVM_CONTRACT_ADDRESS")?,
            private_key: required("EVM_PRIVATE_KEY")?,
            confirmations: optional("EVM_CONFIRMATIONS").unwrap_or(default_confirmations()),
            start_height: optional("EVM_START_HEIGHT").unwrap_or(0),
            gas: optional("EVM_GAS").unwrap_or(default_gas()),
            gas_limit_margin: optional("EVM_GAS_LIMIT_MARGIN")
                .unwrap_or(default_gas_limit_margin()),
            log_range: optional("EVM_LOG_RANGE").unwrap_or(default_log_range()),
            receipt_timeout_ms: optional("EVM_RECEIPT_TIMEOUT_MS")
                .unwrap_or(default_receipt_timeout()),
        };

        let talleo = TalleoConfig {
            daemon_url: required("TALLEO_DAEMON_URL")?,
            wallet_url: required("TALLEO_WALLET_URL")?,
            wallet_password: env::var("TALLEO_WALLET_PASSWORD").ok(),
            bridge_address: required("TALLEO_BRIDGE_ADDRESS")?,
            confirmations: optional("TALLEO_CONFIRMATIONS").unwrap_or(default_confirmations()),
            start_height: optional("TALLEO_START_HEIGHT").unwrap_or(0),
            fee: optional("TALLEO_FEE").unwrap_or(default_fee()),
            anonymity: optional("TALLEO_ANONYMITY").unwrap_or(default_anonymity()),
        };

        let relay = RelayConfig {
            poll_interval_ms: optional("RELAY_POLL_INTERVAL_MS").unwrap_or(default_poll_interval()),
            min_amount: optional("RELAY_MIN_AMOUNT").unwrap_or(default_min_amount()),
            max_attempts: optional("RELAY_MAX_ATTEMPTS"),
            backoff_multiplier: optional("RELAY_BACKOFF_MULTIPLIER")
                .unwrap_or(default_backoff_multiplier()),
            max_backoff_ms: optional("RELAY_MAX_BACKOFF_MS").unwrap_or(default_max_backoff()),
            claim_markers: optional("RELAY_CLAIM_MARKERS").unwrap_or(false),
        };

        let scanner = ScannerConfig {
            interval_ms: optional("SCAN_INTERVAL_MS").unwrap_or(default_scan_interval()),
            batch_size: optional("SCAN_BATCH_SIZE").unwrap_or(default_scan_batch_size()),
            safety_lag: optional("SCAN_SAFETY_LAG").unwrap_or(default_safety_lag()),
        };

        let config = Config {
            database,
            evm,
            talleo,
            relay,
            scanner,
            api_port: optional("API_PORT").unwrap_or(default_api_port()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        if self.evm.rpc_url.is_empty() {
            return Err(eyre!("evm.rpc_url cannot be empty"));
        }

        if self.evm.ws_url.is_empty() {
            return Err(eyre!("evm.ws_url cannot be empty"));
        }

        // The contract binding is compiled in, so an unusable address is the
        // only way the contract definition can be missing
        if !is_valid_evm_address(&self.evm.contract_address) {
            return Err(eyre!(
                "evm.contract_address must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        if self.evm.private_key.len() != 66 || !self.evm.private_key.starts_with("0x") {
            return Err(eyre!("evm.private_key must be 66 chars (0x + 64 hex chars)"));
        }

        if self.evm.confirmations == 0 || self.talleo.confirmations == 0 {
            return Err(eyre!("confirmation thresholds must be at least 1"));
        }

        if self.evm.log_range == 0 {
            return Err(eyre!("evm.log_range must be at least 1"));
        }

        if self.evm.receipt_timeout_ms == 0 {
            return Err(eyre!("evm.receipt_timeout_ms must be positive"));
        }

        if self.talleo.daemon_url.is_empty() || self.talleo.wallet_url.is_empty() {
            return Err(eyre!("talleo daemon and wallet URLs cannot be empty"));
        }

        if self.talleo.bridge_address.is_empty() {
            return Err(eyre!("talleo.bridge_address cannot be empty"));
        }
        talleo_address_to_bytes(&self.talleo.bridge_address)
            .wrap_err("talleo.bridge_address must be base58")?;

        if self.talleo.fee >= self.relay.min_amount {
            return Err(eyre!(
                "talleo.fee ({}) must be below relay.min_amount ({})",
                self.talleo.fee,
                self.relay.min_amount
            ));
        }

        if self.relay.poll_interval_ms == 0 {
            return Err(eyre!("relay.poll_interval_ms must be positive"));
        }

        if self.relay.backoff_multiplier < 1.0 {
            return Err(eyre!("relay.backoff_multiplier cannot be below 1.0"));
        }

        if self.relay.max_attempts == Some(0) {
            return Err(eyre!("relay.max_attempts must be at least 1 when set"));
        }

        if self.scanner.batch_size == 0 {
            return Err(eyre!("scanner.batch_size must be at least 1"));
        }

        Ok(())
    }
}
