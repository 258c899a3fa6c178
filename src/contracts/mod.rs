//! Contract ABI definitions for the Ethereum side of the bridge

pub mod wtlo;

pub use wtlo::WrappedTalleo;
