//! E4 streaming adapter
//!
//! Drives a [`Connection`] until stopped. The loop exits on the first fatal
//! socket error. Stop, fatal error and external shutdown all go through the
//! same single cleanup step; dropping a run future tears the connection down
//! synchronously instead. Reconnecting is left to the caller.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::channel::Demultiplexer;
use crate::error::Result;
use crate::session::ConnectionState;
use crate::stats::AdapterStats;

use super::config::AdapterConfig;
use super::connection::{Connection, ReadOutcome};

/// Cloneable handle that stops a running adapter.
///
/// The flag is checked between receives, so a stop takes effect within one
/// read timeout.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the read loop to exit
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Streaming adapter for one E4 device
///
/// # Example
/// ```no_run
/// use e4_streamer::channel::{Demultiplexer, MpscSink};
/// use e4_streamer::protocol::Modality;
/// use e4_streamer::{AdapterConfig, E4Adapter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (sink, mut samples) = MpscSink::channel(1024);
/// let demux = Demultiplexer::new().with_sink(Modality::Bvp, sink)?;
/// let config = AdapterConfig::default().modalities(&[Modality::Bvp]);
///
/// let mut adapter = E4Adapter::new(config, demux);
/// if adapter.connect().await {
///     let (stop, task) = adapter.spawn();
///     while let Some(sample) = samples.recv().await {
///         println!("{} {:?}", sample.timestamp_seconds, sample.values);
///     }
///     stop.stop();
///     task.await??;
/// }
/// # Ok(())
/// # }
/// ```
pub struct E4Adapter<S = TcpStream> {
    connection: Connection<S>,
    running: Arc<AtomicBool>,
}

impl<S> E4Adapter<S> {
    /// Create an adapter; the routing table is fixed from here on
    pub fn new(config: AdapterConfig, demux: Demultiplexer) -> Self {
        Self {
            connection: Connection::new(config, demux),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle that can stop the loop from elsewhere
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Clear the running flag
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn stats(&self) -> &AdapterStats {
        self.connection.stats()
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.connection
    }
}

impl E4Adapter<TcpStream> {
    /// Connect to the bridge and subscribe.
    ///
    /// Returns `false` (and logs why) if the connect or handshake failed;
    /// no socket is kept in that case.
    pub async fn connect(&mut self) -> bool {
        match self.connection.connect().await {
            Ok(()) => {
                self.running.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                tracing::error!(
                    addr = %self.connection.config().bridge_addr,
                    error = %e,
                    details = ?e,
                    "Failed to connect to E4 bridge"
                );
                false
            }
        }
    }
}

impl<S> E4Adapter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Subscribe over an already-open stream
    pub async fn attach(&mut self, stream: S) -> bool {
        match self.connection.attach(stream).await {
            Ok(()) => {
                self.running.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, details = ?e, "Failed to attach E4 stream");
                false
            }
        }
    }

    /// Run the read loop until stopped or a fatal error.
    ///
    /// The socket is closed on return. After a fatal error the configured
    /// backoff elapses before the error is returned. If the future is
    /// dropped before completing, the connection is torn down on drop.
    pub async fn run(&mut self) -> Result<()> {
        let mut guard = RunGuard::new(&mut self.connection, &self.running);
        let result = read_loop(&mut *guard.connection, guard.running).await;
        guard.finish(result).await
    }

    /// Run the read loop until stopped, a fatal error, or `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut guard = RunGuard::new(&mut self.connection, &self.running);
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = read_loop(&mut *guard.connection, guard.running) => result,
        };
        guard.finish(result).await
    }

    /// Stop the loop and close the socket. Safe at any time.
    pub async fn close(&mut self) {
        self.stop();
        self.connection.close().await;
    }
}

async fn read_loop<S>(connection: &mut Connection<S>, running: &AtomicBool) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!("Read loop started");

    while running.load(Ordering::Acquire) {
        match connection.read_once().await? {
            ReadOutcome::Dispatched(samples) => {
                tracing::trace!(samples, "Chunk processed");
            }
            ReadOutcome::TimedOut => {
                tracing::trace!("No data this iteration");
            }
        }
    }

    tracing::debug!("Read loop stopped");
    Ok(())
}

/// Cleanup for one run. Dropping it mid-run aborts the connection.
struct RunGuard<'a, S> {
    connection: &'a mut Connection<S>,
    running: &'a AtomicBool,
}

impl<'a, S> RunGuard<'a, S> {
    fn new(connection: &'a mut Connection<S>, running: &'a AtomicBool) -> Self {
        Self {
            connection,
            running,
        }
    }
}

impl<S> RunGuard<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn finish(&mut self, result: Result<()>) -> Result<()> {
        self.running.store(false, Ordering::Release);
        self.connection.close().await;

        if let Err(ref e) = result {
            tracing::error!(error = %e, details = ?e, "E4 stream failed");
            let backoff = self.connection.config().error_backoff;
            tokio::time::sleep(backoff).await;
        }
        result
    }
}

impl<S> Drop for RunGuard<'_, S> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.connection.abort();
    }
}

impl<S> E4Adapter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Run on a dedicated task.
    ///
    /// The task yields the adapter back so its stats can be inspected and
    /// the caller can reconnect.
    pub fn spawn(mut self) -> (StopHandle, JoinHandle<Result<Self>>) {
        let stop = self.stop_handle();
        let handle = tokio::spawn(async move {
            self.run().await?;
            Ok(self)
        });
        (stop, handle)
    }
}
