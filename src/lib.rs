//! TLO Bridge - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod address_codec;
pub mod api;
pub mod config;
pub mod confirmation;
pub mod contracts;
pub mod db;
pub mod evm_client;
pub mod metrics;
pub mod state;
pub mod talleo_client;
pub mod types;
pub mod watchers;
pub mod writers;

#[cfg(test)]
pub(crate) mod testing;
