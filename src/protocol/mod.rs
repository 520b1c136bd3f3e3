//! E4 streaming bridge protocol
//!
//! The bridge speaks a line-oriented text protocol over one TCP socket:
//!
//! ```text
//! Client                                     Bridge
//!   |--- device_list\r\n ------------------->|
//!   |<-- R device_list ... ------------------|
//!   |--- device_connect <id>\r\n ----------->|
//!   |<-- R device_connect OK ----------------|
//!   |--- pause ON\r\n ---------------------->|
//!   |--- device_subscribe acc ON\r\n ------->|   (once per modality)
//!   |--- pause OFF\r\n --------------------->|
//!   |                                        |
//!   |<-- E4_Acc 1633.12 -12 40 61\n ---------|
//!   |<-- E4_Bvp 1633.13 -3,417\n ------------|
//! ```
//!
//! Every command elicits one response, which is read but not interpreted.
//! Streaming records arrive in arbitrary chunks and must be reassembled.

pub mod command;
pub mod constants;
pub mod frame;
pub mod handshake;
pub mod record;

pub use command::Command;
pub use frame::FrameBuffer;
pub use handshake::Handshake;
pub use record::{parse, Modality, Reading, Sample, Values};
