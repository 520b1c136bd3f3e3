//! Control commands sent to the bridge

use std::fmt;

use bytes::Bytes;

use crate::protocol::constants::COMMAND_TERMINATOR;
use crate::protocol::record::Modality;

/// A bridge control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List devices known to the bridge
    DeviceList,
    /// Attach the bridge to one device
    DeviceConnect(String),
    /// Pause (`true`) or resume (`false`) streaming
    Pause(bool),
    /// Enable one modality
    Subscribe(Modality),
}

impl Command {
    /// Wire encoding, including the `\r\n` terminator
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("{}{}", self, COMMAND_TERMINATOR))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::DeviceList => write!(f, "device_list"),
            Command::DeviceConnect(id) => write!(f, "device_connect {}", id),
            Command::Pause(true) => write!(f, "pause ON"),
            Command::Pause(false) => write!(f, "pause OFF"),
            Command::Subscribe(modality) => {
                write!(f, "device_subscribe {} ON", modality.subscription_name())
            }
        }
    }
}
