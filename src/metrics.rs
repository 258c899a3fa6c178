//! Prometheus metrics for the TLO bridge
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};

lazy_static! {
    pub static ref TRANSFERS_DETECTED: CounterVec = register_counter_vec!(
        "tlo_bridge_transfers_detected_total",
        "Conversion requests observed on the origin chain",
        &["chain"]
    ).unwrap();

    pub static ref RELAYS: CounterVec = register_counter_vec!(
        "tlo_bridge_relays_total",
        "Terminal outcomes of tracked transfers",
        &["chain", "outcome"]
    ).unwrap();

    pub static ref TRACKED_TRANSFERS: Gauge = register_gauge!(
        "tlo_bridge_tracked_transfers",
        "Transfers currently waiting for confirmation or relay"
    ).unwrap();

    pub static ref LATEST_BLOCK: GaugeVec = register_gauge_vec!(
        "tlo_bridge_latest_block",
        "Latest cursor block per chain",
        &["chain"]
    ).unwrap();

    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "tlo_bridge_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "tlo_bridge_up",
        "Whether the bridge is up and running"
    ).unwrap();
}

/// Record a conversion request detected on `chain`
pub fn record_transfer_detected(chain: &str) {
    TRANSFERS_DETECTED.with_label_values(&[chain]).inc();
}

/// Record a terminal outcome for a transfer from `chain`
pub fn record_relay_outcome(chain: &str, outcome: &str) {
    RELAYS.with_label_values(&[chain, outcome]).inc();
}

pub fn set_tracked_transfers(count: usize) {
    TRACKED_TRANSFERS.set(count as f64);
}

pub fn set_latest_block(chain: &str, block_number: u64) {
    LATEST_BLOCK.with_label_values(&[chain]).set(block_number as f64);
}

/// Record an error
pub fn record_error(chain: &str, error_type: &str) {
    ERRORS.with_label_values(&[chain, error_type]).inc();
}
