//! E4 wristband streaming adapter
//!
//! Connects to the E4 streaming bridge over TCP, subscribes to the requested
//! physiological channels and delivers every sample to a per-modality sink.
//!
//! ```text
//!  TCP bytes ─► FrameBuffer ─► lines ─► parse ─► Demultiplexer ─┬─► acc sink
//!                                                                ├─► bvp sink
//!                                                                ├─► gsr sink
//!                                                                └─► tmp sink
//! ```
//!
//! Malformed input is logged and skipped. A socket failure ends the read
//! loop, closes the socket and is returned to the caller, who decides
//! whether to reconnect.
//!
//! # Example
//! ```no_run
//! use e4_streamer::channel::{ChannelDescriptor, Demultiplexer};
//! use e4_streamer::protocol::Modality;
//! use e4_streamer::{AdapterConfig, E4Adapter};
//!
//! # async fn example() -> e4_streamer::error::Result<()> {
//! let mut demux = Demultiplexer::new();
//! for modality in Modality::ALL {
//!     let sink = |channel: &ChannelDescriptor, ts: f64, values: &[f64]| {
//!         println!("{} {:.3} {:?}", channel, ts, values);
//!     };
//!     demux
//!         .register(modality, ChannelDescriptor::for_modality(modality), sink)
//!         .expect("one sink per modality");
//! }
//!
//! let mut adapter = E4Adapter::new(AdapterConfig::default(), demux);
//! if adapter.connect().await {
//!     adapter.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod protocol;
pub mod session;
pub mod stats;

#[cfg(test)]
mod testing;

pub use channel::{ChannelDescriptor, ChannelSink, Demultiplexer};
pub use client::{AdapterConfig, E4Adapter, StopHandle};
pub use error::{Error, Result};
pub use protocol::{Modality, Sample};
pub use session::ConnectionState;
