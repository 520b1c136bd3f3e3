//! Line reassembly
//!
//! Socket reads have no alignment with protocol lines: one read may carry
//! several records, and a record may be split across two reads. The frame
//! buffer accumulates chunks and hands out complete lines only.

use bytes::BytesMut;

use crate::error::FrameError;
use crate::protocol::constants::{DEFAULT_MAX_PENDING_BYTES, LINE_TERMINATOR};

/// Accumulator for partial lines
#[derive(Debug)]
pub struct FrameBuffer {
    pending: BytesMut,
    /// Prefix of `pending` already known to hold no terminator
    scanned: usize,
    max_pending: usize,
}

impl FrameBuffer {
    /// Create a buffer with the default pending limit
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING_BYTES)
    }

    /// Create a buffer that drops unterminated data past `max_pending` bytes
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(max_pending.min(8 * 1024)),
            scanned: 0,
            max_pending,
        }
    }

    /// Append one raw chunk
    pub fn append(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pop the next complete line.
    ///
    /// Returns `None` when only a partial line (or nothing) remains. Empty
    /// lines are skipped. A line that is not valid UTF-8 is removed and
    /// reported as an error, as is an unterminated run longer than the limit.
    pub fn next_line(&mut self) -> Option<Result<String, FrameError>> {
        loop {
            let offset = self.scanned;
            let Some(found) = self.pending[offset..]
                .iter()
                .position(|&b| b == LINE_TERMINATOR)
            else {
                self.scanned = self.pending.len();
                if self.pending.len() > self.max_pending {
                    let len = self.pending.len();
                    self.clear();
                    return Some(Err(FrameError::Overflow { len }));
                }
                return None;
            };

            let end = offset + found;
            let mut line = self.pending.split_to(end + 1);
            self.scanned = 0;

            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => return Some(Ok(text.to_owned())),
                Err(_) => return Some(Err(FrameError::InvalidText { len: line.len() })),
            }
        }
    }

    /// Drain every complete line currently buffered
    pub fn extract_lines(&mut self) -> Vec<Result<String, FrameError>> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Number of bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discard everything buffered
    pub fn clear(&mut self) {
        self.pending.clear();
        self.scanned = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
