//! Statistics for an adapter instance

use std::time::{Duration, Instant};

use crate::protocol::record::Modality;

/// Counters for one adapter.
///
/// Dropped-line counters are split by cause so a noisy link can be told
/// apart from a mismatched protocol.
#[derive(Debug, Clone, Default)]
pub struct AdapterStats {
    /// Total bytes received while streaming
    pub bytes_received: u64,
    /// Socket reads that returned data
    pub chunks: u64,
    /// Complete lines extracted
    pub lines: u64,
    /// Samples dispatched, indexed by [`Modality::index`]
    pub dispatched: [u64; 4],
    /// Lines with an unknown tag
    pub unknown_tags: u64,
    /// Lines with a known tag but bad payload
    pub malformed: u64,
    /// Lines that were not valid text
    pub decode_errors: u64,
    /// Bytes dropped for lacking a terminator
    pub overflow_bytes: u64,
    /// Parsed samples with no registered sink
    pub unrouted: u64,
    /// Reads that timed out with no data
    pub read_timeouts: u64,
    /// Completed connection teardowns
    pub teardowns: u64,
    /// When streaming started
    pub started_at: Option<Instant>,
}

impl AdapterStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one dispatched sample
    pub fn record_dispatch(&mut self, modality: Modality) {
        self.dispatched[modality.index()] += 1;
    }

    /// Samples dispatched for a modality
    pub fn dispatched_for(&self, modality: Modality) -> u64 {
        self.dispatched[modality.index()]
    }

    /// Samples dispatched across all modalities
    pub fn total_dispatched(&self) -> u64 {
        self.dispatched.iter().sum()
    }

    /// Lines that did not produce a sample
    pub fn dropped_lines(&self) -> u64 {
        self.unknown_tags + self.malformed + self.decode_errors
    }

    /// Time since streaming started
    pub fn duration(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Observed sample rate for a modality in Hz
    pub fn rate_hz(&self, modality: Modality) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.dispatched_for(modality) as f64 / secs
        } else {
            0.0
        }
    }
}
