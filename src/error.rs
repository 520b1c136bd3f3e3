//! Error types
//!
//! Only socket-level failures are fatal to a stream. Line-level failures
//! ([`ParseError`], [`FrameError`]) are reported, counted and skipped.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Result alias for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal adapter error
#[derive(Debug)]
pub enum Error {
    /// Socket-level I/O failure (reset, refused, OS error)
    Io(io::Error),
    /// TCP connect did not complete in time
    ConnectTimeout(SocketAddr, Duration),
    /// Subscription handshake failed
    Handshake(HandshakeError),
    /// Peer closed the connection
    ConnectionClosed,
    /// Operation requires an open connection
    NotConnected,
}

impl Error {
    /// Whether this error was caused by the peer going away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::ConnectTimeout(addr, timeout) => {
                write!(f, "Connect to {} timed out after {:?}", addr, timeout)
            }
            Error::Handshake(e) => write!(f, "Handshake failed: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed by peer"),
            Error::NotConnected => write!(f, "Not connected"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Handshake(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

/// What went wrong during one handshake step
#[derive(Debug)]
pub enum HandshakeErrorKind {
    /// No response within the read timeout
    Timeout,
    /// Peer closed the connection before responding
    Closed,
    /// Socket error while sending or receiving
    Io(io::Error),
}

/// Handshake failure, tagged with the command that was in flight
#[derive(Debug)]
pub struct HandshakeError {
    /// Command line being exchanged (without terminator)
    pub step: String,
    pub kind: HandshakeErrorKind,
}

impl HandshakeError {
    pub fn new(step: impl Into<String>, kind: HandshakeErrorKind) -> Self {
        Self {
            step: step.into(),
            kind,
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HandshakeErrorKind::Timeout => write!(f, "no response to '{}'", self.step),
            HandshakeErrorKind::Closed => {
                write!(f, "connection closed during '{}'", self.step)
            }
            HandshakeErrorKind::Io(e) => write!(f, "I/O error during '{}': {}", self.step, e),
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            HandshakeErrorKind::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// A line that could not be turned into a sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// First token is not a known modality tag
    UnknownTag(String),
    /// Known tag, but the timestamp or payload is unusable
    Malformed { line: String, reason: &'static str },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownTag(tag) => write!(f, "Unknown tag: {}", tag),
            ParseError::Malformed { line, reason } => {
                write!(f, "Malformed record ({}): {:?}", reason, line)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Bytes the frame buffer had to discard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A complete line was not valid UTF-8
    InvalidText { len: usize },
    /// Pending bytes grew past the limit without a terminator
    Overflow { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidText { len } => {
                write!(f, "Dropped {} bytes of invalid text", len)
            }
            FrameError::Overflow { len } => {
                write!(f, "Dropped {} bytes without line terminator", len)
            }
        }
    }
}

impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        assert!(Error::ConnectionClosed.is_disconnect());
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_disconnect());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_disconnect());
        assert!(!Error::NotConnected.is_disconnect());
    }

    #[test]
    fn test_handshake_error_display() {
        let err = HandshakeError::new("pause ON", HandshakeErrorKind::Timeout);
        assert_eq!(err.to_string(), "no response to 'pause ON'");

        let err: Error = err.into();
        assert!(err.to_string().starts_with("Handshake failed"));
    }
}
