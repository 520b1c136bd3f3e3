//! Streaming bridge protocol constants

use std::net::Ipv4Addr;

/// Default bridge host
pub const DEFAULT_BRIDGE_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 6);

/// Default bridge port
pub const DEFAULT_BRIDGE_PORT: u16 = 3002;

/// Default device identifier used in `device_connect`
pub const DEFAULT_DEVICE_ID: &str = "D931CD";

/// Bounded size of a single socket receive
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Largest unterminated line the frame buffer will hold
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024;

/// Record terminator on the streaming side
pub const LINE_TERMINATOR: u8 = b'\n';

/// Command terminator on the control side
pub const COMMAND_TERMINATOR: &str = "\r\n";

// Record tags
pub const TAG_ACC: &str = "E4_Acc";
pub const TAG_BVP: &str = "E4_Bvp";
pub const TAG_GSR: &str = "E4_Gsr";
pub const TAG_TEMPERATURE: &str = "E4_Temperature";

// Subscription names
pub const SUBSCRIBE_ACC: &str = "acc";
pub const SUBSCRIBE_BVP: &str = "bvp";
pub const SUBSCRIBE_GSR: &str = "gsr";
pub const SUBSCRIBE_TEMPERATURE: &str = "tmp";
