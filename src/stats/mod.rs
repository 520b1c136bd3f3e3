//! Adapter statistics

pub mod metrics;

pub use metrics::AdapterStats;
