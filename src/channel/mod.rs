//! Per-modality channels
//!
//! Parsed samples leave the protocol domain here. Each enabled modality is
//! bound to one [`ChannelSink`] under a [`ChannelDescriptor`] naming the
//! downstream `(device_name, stream_name)` pair.
//!
//! ```text
//!                    Demultiplexer
//!   Sample ───► ┌──────────────────────┐
//!               │ Acceleration ─► sink │──► ACC-empatica_e4/acc-values
//!               │ Bvp          ─► sink │──► BVP-empatica_e4/bvp-values
//!               │ Gsr          ─► sink │──► GSR-empatica_e4/gsr-values
//!               │ Temperature  ─► sink │──► Tmp-empatica_e4/tmp-values
//!               └──────────────────────┘
//! ```

pub mod demux;
pub mod descriptor;
pub mod error;
pub mod sink;

pub use demux::Demultiplexer;
pub use descriptor::{ChannelDescriptor, SampleType};
pub use error::ChannelError;
pub use sink::{ChannelSample, ChannelSink, MpscSink};
