//! Connection state machine
//!
//! Tracks one bridge connection from connect to teardown.
//!
//! ```text
//! Disconnected ─► Connecting ─► Subscribing ─► Streaming
//!      ▲              │              │             │
//!      │              ▼              ▼             ▼
//!      └──────────────────────── Failed ◄──────────┘
//! ```
//!
//! A connect failure returns straight to `Disconnected`. Every other failure
//! passes through `Failed` until teardown resets the state.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Handshake in progress
    Subscribing,
    /// Handshake complete, records flowing
    Streaming,
    /// Socket error, awaiting teardown
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Current state
    pub state: ConnectionState,

    /// Bridge address, once connected
    pub peer_addr: Option<SocketAddr>,

    /// Time the socket was established
    pub connected_at: Option<Instant>,

    /// Time the handshake completed
    pub streaming_since: Option<Instant>,

    /// Time of the last received chunk
    pub last_data_at: Option<Instant>,

    /// Reason for the last failure
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            peer_addr: None,
            connected_at: None,
            streaming_since: None,
            last_data_at: None,
            last_error: None,
        }
    }

    /// Transition to connecting
    pub fn start_connecting(&mut self) {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connecting;
        }
    }

    /// Connect refused or timed out; no socket was created
    pub fn connect_failed(&mut self, reason: impl Into<String>) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Disconnected;
            self.last_error = Some(reason.into());
        }
    }

    /// Socket established, handshake begins
    pub fn start_subscribing(&mut self, peer_addr: Option<SocketAddr>) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Subscribing;
            self.peer_addr = peer_addr;
            self.connected_at = Some(Instant::now());
        }
    }

    /// Handshake complete
    pub fn start_streaming(&mut self) {
        if self.state == ConnectionState::Subscribing {
            self.state = ConnectionState::Streaming;
            self.streaming_since = Some(Instant::now());
        }
    }

    /// Socket failure during handshake or streaming
    pub fn fail(&mut self, reason: impl Into<String>) {
        if matches!(
            self.state,
            ConnectionState::Subscribing | ConnectionState::Streaming
        ) {
            self.state = ConnectionState::Failed;
            self.last_error = Some(reason.into());
        }
    }

    /// Record data arrival
    pub fn on_data(&mut self) {
        self.last_data_at = Some(Instant::now());
    }

    /// Teardown: back to disconnected from any state
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.peer_addr = None;
        self.connected_at = None;
        self.streaming_since = None;
        self.last_data_at = None;
    }

    /// Check if records are flowing
    pub fn is_streaming(&self) -> bool {
        self.state == ConnectionState::Streaming
    }

    /// Check if a socket is held
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Subscribing | ConnectionState::Streaming | ConnectionState::Failed
        )
    }

    /// Time since the socket was established
    pub fn duration(&self) -> Option<Duration> {
        self.connected_at.map(|t| t.elapsed())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
