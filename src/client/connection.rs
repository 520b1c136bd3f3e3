//! Bridge connection
//!
//! Owns the socket for its whole lifetime: connect, subscription handshake,
//! the streaming read pipeline and teardown.
//!
//! ```text
//! socket.read ─► FrameBuffer ─► lines ─► record::parse ─► Demultiplexer ─► sinks
//! ```
//!
//! Only socket failures are fatal. Undecodable, unknown and malformed lines
//! are counted and skipped.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::channel::Demultiplexer;
use crate::error::{Error, FrameError, HandshakeError, HandshakeErrorKind, ParseError, Result};
use crate::protocol::command::Command;
use crate::protocol::frame::FrameBuffer;
use crate::protocol::handshake::{is_error_reply, Handshake};
use crate::protocol::record::{self, Modality};
use crate::session::{ConnectionState, SessionState};
use crate::stats::AdapterStats;

use super::config::AdapterConfig;

/// Result of one streaming receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Data arrived; this many samples were dispatched (possibly zero)
    Dispatched(usize),
    /// No data within the read timeout
    TimedOut,
}

/// Connection to the streaming bridge
pub struct Connection<S = TcpStream> {
    config: AdapterConfig,
    stream: Option<S>,
    frames: FrameBuffer,
    demux: Demultiplexer,
    subscriptions: Vec<Modality>,
    session: SessionState,
    stats: AdapterStats,
    read_buf: Vec<u8>,
}

impl<S> Connection<S> {
    /// Create a disconnected connection.
    ///
    /// Only modalities that are both enabled and routed are subscribed.
    pub fn new(config: AdapterConfig, demux: Demultiplexer) -> Self {
        let frames = FrameBuffer::with_max_pending(config.max_pending_bytes);
        let read_buf = vec![0u8; config.read_buffer_size.max(1)];
        let subscriptions = config.subscriptions(&demux);

        Self {
            config,
            stream: None,
            frames,
            demux,
            subscriptions,
            session: SessionState::new(),
            stats: AdapterStats::new(),
            read_buf,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn stats(&self) -> &AdapterStats {
        &self.stats
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }

    /// Modalities requested during the handshake
    pub fn subscriptions(&self) -> &[Modality] {
        &self.subscriptions
    }

    /// Check if a socket is currently held
    pub fn has_socket(&self) -> bool {
        self.stream.is_some()
    }
}

impl Connection<TcpStream> {
    /// Connect to the configured bridge and run the handshake.
    ///
    /// On failure no socket is kept and the state is `Disconnected`.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.state != ConnectionState::Disconnected {
            self.close().await;
        }

        let addr = self.config.bridge_addr;
        let connect_timeout = self.config.connect_timeout;
        self.session.start_connecting();
        tracing::info!(addr = %addr, "Connecting to E4 bridge");

        let socket = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                self.session.connect_failed(e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                let err = Error::ConnectTimeout(addr, connect_timeout);
                self.session.connect_failed(err.to_string());
                return Err(err);
            }
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let peer_addr = socket.peer_addr().ok();
        self.establish(socket, peer_addr).await
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the handshake over an already-open stream
    pub async fn attach(&mut self, stream: S) -> Result<()> {
        if self.session.state != ConnectionState::Disconnected {
            self.close().await;
        }
        self.session.start_connecting();
        self.establish(stream, None).await
    }

    async fn establish(&mut self, stream: S, peer_addr: Option<SocketAddr>) -> Result<()> {
        self.session.start_subscribing(peer_addr);
        self.stream = Some(stream);
        self.frames.clear();
        self.demux.open_all();

        if let Err(e) = self.subscribe().await {
            tracing::debug!(error = %e, "Subscription handshake failed");
            self.session.fail(e.to_string());
            self.close().await;
            return Err(e);
        }

        self.session.start_streaming();
        self.stats.started_at = Some(Instant::now());
        tracing::info!(
            device = %self.config.device_id,
            modalities = ?self.subscriptions,
            "Streaming from E4 bridge"
        );
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<()> {
        let mut handshake = Handshake::new(&self.config.device_id, &self.subscriptions);
        while let Some(command) = handshake.next_command().cloned() {
            self.exchange(&command).await?;
        }
        Ok(())
    }

    /// Send one command and read one reply
    async fn exchange(&mut self, command: &Command) -> Result<String> {
        let read_timeout = self.config.read_timeout;
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let step = command.to_string();
        let io_error =
            |e: std::io::Error| HandshakeError::new(step.clone(), HandshakeErrorKind::Io(e));

        stream.write_all(&command.encode()).await.map_err(io_error)?;
        stream.flush().await.map_err(io_error)?;

        let n = match timeout(read_timeout, stream.read(&mut self.read_buf)).await {
            Ok(Ok(0)) => {
                return Err(HandshakeError::new(step, HandshakeErrorKind::Closed).into());
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(io_error(e).into()),
            Err(_) => {
                return Err(HandshakeError::new(step, HandshakeErrorKind::Timeout).into());
            }
        };

        let reply = String::from_utf8_lossy(&self.read_buf[..n]).trim().to_owned();
        if is_error_reply(&reply) {
            tracing::warn!(command = %step, reply = %reply, "Bridge reported an error");
        } else {
            tracing::debug!(command = %step, reply = %reply, "Handshake step");
        }
        Ok(reply)
    }

    /// Perform one bounded receive and push it through the pipeline.
    ///
    /// A receive timeout is `Ok(ReadOutcome::TimedOut)`. A socket failure or
    /// peer close moves the connection to `Failed` and returns the error.
    pub async fn read_once(&mut self) -> Result<ReadOutcome> {
        if !self.session.is_streaming() {
            return Err(Error::NotConnected);
        }

        let read_timeout = self.config.read_timeout;
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let n = match timeout(read_timeout, stream.read(&mut self.read_buf)).await {
            Err(_) => {
                self.stats.read_timeouts += 1;
                return Ok(ReadOutcome::TimedOut);
            }
            Ok(Err(e)) if is_no_data(&e) => {
                self.stats.read_timeouts += 1;
                return Ok(ReadOutcome::TimedOut);
            }
            Ok(Err(e)) => {
                self.session.fail(e.to_string());
                return Err(e.into());
            }
            Ok(Ok(0)) => {
                self.session.fail("closed by peer");
                return Err(Error::ConnectionClosed);
            }
            Ok(Ok(n)) => n,
        };

        self.session.on_data();
        self.stats.bytes_received += n as u64;
        self.stats.chunks += 1;
        self.frames.append(&self.read_buf[..n]);

        Ok(ReadOutcome::Dispatched(self.drain_frames()))
    }

    /// Close the socket and reset all per-connection state.
    ///
    /// Safe to call in any state and more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(error = %e, "Socket shutdown failed");
            }
            self.stats.teardowns += 1;
            self.log_teardown("Connection closed");
        }
        self.reset();
    }
}

impl<S> Connection<S> {
    /// Tear down without awaiting: the socket is dropped rather than shut
    /// down. Used when a run is cancelled; a no-op after [`close`](Self::close).
    pub fn abort(&mut self) {
        if self.stream.take().is_some() {
            self.stats.teardowns += 1;
            self.log_teardown("Connection aborted");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.demux.close_all();
        self.frames.clear();
        self.session.reset();
    }

    fn log_teardown(&self, message: &'static str) {
        tracing::info!(
            state = %self.session.state,
            connected_for = ?self.session.duration(),
            samples = self.stats.total_dispatched(),
            dropped_lines = self.stats.dropped_lines(),
            "{}",
            message
        );
    }

    /// Parse and dispatch every complete buffered line
    fn drain_frames(&mut self) -> usize {
        let mut dispatched = 0;

        while let Some(frame) = self.frames.next_line() {
            let line = match frame {
                Ok(line) => line,
                Err(e) => {
                    match e {
                        FrameError::InvalidText { .. } => self.stats.decode_errors += 1,
                        FrameError::Overflow { len } => self.stats.overflow_bytes += len as u64,
                    }
                    tracing::debug!(error = %e, "Frame dropped");
                    continue;
                }
            };
            self.stats.lines += 1;

            match record::parse(&line) {
                Ok(sample) => {
                    if self.demux.dispatch(&sample) {
                        self.stats.record_dispatch(sample.modality());
                        dispatched += 1;
                    } else {
                        self.stats.unrouted += 1;
                    }
                }
                Err(e) => {
                    match e {
                        ParseError::UnknownTag(_) => self.stats.unknown_tags += 1,
                        ParseError::Malformed { .. } => self.stats.malformed += 1,
                    }
                    tracing::debug!(error = %e, "Record dropped");
                }
            }
        }

        dispatched
    }
}

/// Errors that mean "nothing to read yet" rather than a broken socket
fn is_no_data(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_test::io::{Builder, Mock};

    use crate::channel::{ChannelSample, MpscSink};
    use crate::protocol::record::Modality;

    fn test_config() -> AdapterConfig {
        crate::testing::init_tracing();
        AdapterConfig::default()
            .read_timeout(Duration::from_millis(50))
            .error_backoff(Duration::ZERO)
    }

    /// Script the handshake for a config and routing table onto a mock
    fn script_handshake<'a>(
        builder: &'a mut Builder,
        config: &AdapterConfig,
        demux: &Demultiplexer,
    ) -> &'a mut Builder {
        let subscriptions = config.subscriptions(demux);
        for command in Handshake::new(&config.device_id, &subscriptions).steps() {
            builder
                .write(&command.encode())
                .read(format!("R {} OK\n", command).as_bytes());
        }
        builder
    }

    fn routed_demux() -> (Demultiplexer, Vec<mpsc::Receiver<ChannelSample>>) {
        let mut demux = Demultiplexer::new();
        let mut receivers = Vec::new();
        for modality in Modality::ALL {
            let (sink, rx) = MpscSink::channel(64);
            demux = demux.with_sink(modality, sink).unwrap();
            receivers.push(rx);
        }
        (demux, receivers)
    }

    fn drain(rx: &mut mpsc::Receiver<ChannelSample>) -> Vec<ChannelSample> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn streaming(mock: Mock, config: AdapterConfig, demux: Demultiplexer) -> Connection<Mock> {
        let mut conn = Connection::new(config, demux);
        conn.attach(mock).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Streaming);
        conn
    }

    #[tokio::test]
    async fn test_handshake_then_stream() {
        let config = test_config();
        let (demux, mut receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux)
            .read(b"E4_Acc 10.0 1 2 3\nE4_Bvp 10,0 -1,5\nE4_Gs")
            .read(b"r 10.1 0.25\nE4_Temperature 10.2 33.4\n")
            .build();
        let mut conn = streaming(mock, config, demux).await;

        assert_eq!(conn.read_once().await.unwrap(), ReadOutcome::Dispatched(2));
        assert_eq!(conn.read_once().await.unwrap(), ReadOutcome::Dispatched(2));

        let acc = drain(&mut receivers[0]);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc[0].values, vec![1.0, 2.0, 3.0]);

        let bvp = drain(&mut receivers[1]);
        assert_eq!(bvp[0].timestamp_seconds, 10.0);
        assert_eq!(bvp[0].values, vec![-1.5]);

        let gsr = drain(&mut receivers[2]);
        assert_eq!(gsr[0].values, vec![0.25]);
        assert_eq!(gsr[0].stream_name, "gsr-values");

        assert_eq!(drain(&mut receivers[3]).len(), 1);
        assert_eq!(conn.stats().total_dispatched(), 4);
        assert_eq!(conn.stats().lines, 4);

        conn.close().await;
    }

    #[tokio::test]
    async fn test_bad_lines_are_not_fatal() {
        let config = test_config();
        let (demux, mut receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux)
            .read(b"E4_Unknown 1.0 5\nE4_Acc 1.0 1 2\n\xff\xfe\nE4_Gsr 1.0 0.3\n")
            .build();
        let mut conn = streaming(mock, config, demux).await;

        assert_eq!(conn.read_once().await.unwrap(), ReadOutcome::Dispatched(1));
        assert_eq!(conn.state(), ConnectionState::Streaming);

        let stats = conn.stats();
        assert_eq!(stats.unknown_tags, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.decode_errors, 1);
        assert!(drain(&mut receivers[0]).is_empty());
        assert_eq!(drain(&mut receivers[2]).len(), 1);

        conn.close().await;
    }

    #[tokio::test]
    async fn test_unknown_tag_dispatches_nothing() {
        let config = test_config();
        let (demux, mut receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux)
            .read(b"E4_Unknown 1.0 5\n")
            .build();
        let mut conn = streaming(mock, config, demux).await;

        assert_eq!(conn.read_once().await.unwrap(), ReadOutcome::Dispatched(0));
        for rx in receivers.iter_mut() {
            assert!(drain(rx).is_empty());
        }

        conn.close().await;
    }

    #[tokio::test]
    async fn test_subscribes_only_routed_modalities() {
        let config = test_config();
        let mock = Builder::new()
            .write(b"device_list\r\n")
            .read(b"R device_list 1 | D931CD Empatica_E4\n")
            .write(b"device_connect D931CD\r\n")
            .read(b"R device_connect OK\n")
            .write(b"pause ON\r\n")
            .read(b"R pause ON\n")
            .write(b"device_subscribe gsr ON\r\n")
            .read(b"R device_subscribe gsr OK\n")
            .write(b"pause OFF\r\n")
            .read(b"R pause OFF\n")
            .read(b"E4_Bvp 1.0 2.0\nE4_Gsr 1.0 0.3\n")
            .build();
        let (sink, mut rx) = MpscSink::channel(8);
        let demux = Demultiplexer::new().with_sink(Modality::Gsr, sink).unwrap();
        let mut conn = streaming(mock, config, demux).await;

        assert_eq!(conn.subscriptions(), &[Modality::Gsr]);

        // A stray record for an unsubscribed modality is still ignored
        assert_eq!(conn.read_once().await.unwrap(), ReadOutcome::Dispatched(1));
        assert_eq!(conn.stats().unrouted, 1);
        assert_eq!(drain(&mut rx).len(), 1);

        conn.close().await;
    }

    #[tokio::test]
    async fn test_abort_tears_down_without_await() {
        let config = test_config();
        let (demux, _receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux).build();
        let mut conn = streaming(mock, config, demux).await;
        assert!(conn.demux().is_open());

        conn.abort();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.has_socket());
        assert!(!conn.demux().is_open());
        assert_eq!(conn.stats().teardowns, 1);

        conn.close().await;
        assert_eq!(conn.stats().teardowns, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_not_an_error() {
        let config = test_config();
        let (demux, _receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux)
            .wait(Duration::from_millis(120))
            .read(b"E4_Gsr 1.0 0.3\n")
            .build();
        let mut conn = streaming(mock, config, demux).await;

        assert_eq!(conn.read_once().await.unwrap(), ReadOutcome::TimedOut);
        assert_eq!(conn.state(), ConnectionState::Streaming);

        let mut outcome = ReadOutcome::TimedOut;
        for _ in 0..10 {
            outcome = conn.read_once().await.unwrap();
            if outcome != ReadOutcome::TimedOut {
                break;
            }
        }
        assert_eq!(outcome, ReadOutcome::Dispatched(1));
        assert!(conn.stats().read_timeouts >= 1);

        conn.close().await;
    }

    #[tokio::test]
    async fn test_reset_fails_connection() {
        let config = test_config();
        let (demux, _receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux)
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut conn = streaming(mock, config, demux).await;

        let err = conn.read_once().await.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(conn.state(), ConnectionState::Failed);

        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.has_socket());
        assert_eq!(conn.stats().teardowns, 1);

        // Idempotent
        conn.close().await;
        assert_eq!(conn.stats().teardowns, 1);
    }

    #[tokio::test]
    async fn test_peer_close() {
        let config = test_config();
        let (demux, _receivers) = routed_demux();
        let mock = script_handshake(&mut Builder::new(), &config, &demux).build();
        let mut conn = streaming(mock, config, demux).await;

        assert!(matches!(conn.read_once().await, Err(Error::ConnectionClosed)));
        assert_eq!(conn.state(), ConnectionState::Failed);

        conn.close().await;
    }

    #[tokio::test]
    async fn test_handshake_socket_error() {
        let config = test_config();
        let mock = Builder::new()
            .write(b"device_list\r\n")
            .read(b"R device_list 1 | D931CD Empatica_E4\n")
            .write(b"device_connect D931CD\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (demux, _receivers) = routed_demux();
        let mut conn = Connection::new(config, demux);

        let err = conn.attach(mock).await.unwrap_err();
        match err {
            Error::Handshake(HandshakeError { step, kind: HandshakeErrorKind::Io(_) }) => {
                assert_eq!(step, "device_connect D931CD");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.has_socket());
        assert!(!conn.demux().is_open());
        assert!(conn.session().last_error.is_some());
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let config = test_config();
        let mock = Builder::new()
            .write(b"device_list\r\n")
            .wait(Duration::from_millis(500))
            .build();
        let (demux, _receivers) = routed_demux();
        let mut conn = Connection::new(config, demux);

        let err = conn.attach(mock).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError { kind: HandshakeErrorKind::Timeout, .. })
        ));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_error_reply_does_not_fail_handshake() {
        let config = test_config().modalities(&[Modality::Bvp]);
        let mock = Builder::new()
            .write(b"device_list\r\n")
            .read(b"R device_list 0\n")
            .write(b"device_connect D931CD\r\n")
            .read(b"R device_connect ERR The device requested is not available\n")
            .write(b"pause ON\r\n")
            .read(b"R pause ON\n")
            .write(b"device_subscribe bvp ON\r\n")
            .read(b"R device_subscribe bvp OK\n")
            .write(b"pause OFF\r\n")
            .read(b"R pause OFF\n")
            .build();
        let (demux, _receivers) = routed_demux();
        let mut conn = Connection::new(config, demux);

        conn.attach(mock).await.unwrap();
        assert!(conn.session().is_streaming());

        conn.close().await;
    }

    #[tokio::test]
    async fn test_read_requires_streaming() {
        let mut conn: Connection<Mock> = Connection::new(test_config(), Demultiplexer::new());
        assert!(matches!(conn.read_once().await, Err(Error::NotConnected)));

        conn.close().await;
        assert_eq!(conn.stats().teardowns, 0);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut conn = Connection::new(test_config().bridge(addr), Demultiplexer::new());
        assert!(conn.connect().await.is_err());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.has_socket());
    }
}
