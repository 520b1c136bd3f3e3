//! E4 bridge client
//!
//! Provides the client side of the streaming bridge protocol:
//! - [`Connection`]: socket lifecycle, handshake and the read pipeline
//! - [`E4Adapter`]: the run loop with stop/close lifecycle calls

pub mod adapter;
pub mod config;
pub mod connection;

pub use adapter::{E4Adapter, StopHandle};
pub use config::AdapterConfig;
pub use connection::{Connection, ReadOutcome};
