//! Subscription handshake
//!
//! The bridge is configured with a fixed, strictly request/response script:
//!
//! ```text
//! device_list            -> (device listing)
//! device_connect <id>    -> R device_connect OK
//! pause ON               -> R pause ON
//! device_subscribe X ON  -> R device_subscribe X OK   (per modality)
//! pause OFF              -> R pause OFF
//! ```
//!
//! Responses are read but not interpreted; the bridge reports failures only
//! as free text. Replies containing `ERR` are flagged so they can be logged.

use crate::protocol::command::Command;
use crate::protocol::record::Modality;

/// Ordered handshake script for one connection
#[derive(Debug, Clone)]
pub struct Handshake {
    steps: Vec<Command>,
    next: usize,
}

impl Handshake {
    /// Build the script for a device and its enabled modalities
    pub fn new(device_id: &str, modalities: &[Modality]) -> Self {
        let mut steps = Vec::with_capacity(modalities.len() + 4);
        steps.push(Command::DeviceList);
        steps.push(Command::DeviceConnect(device_id.to_owned()));
        steps.push(Command::Pause(true));
        steps.extend(modalities.iter().copied().map(Command::Subscribe));
        steps.push(Command::Pause(false));

        Self { steps, next: 0 }
    }

    /// Next command to send, advancing the script
    pub fn next_command(&mut self) -> Option<&Command> {
        let step = self.steps.get(self.next)?;
        self.next += 1;
        Some(step)
    }

    /// All steps, in order
    pub fn steps(&self) -> &[Command] {
        &self.steps
    }
}

/// Whether a bridge reply reports a failure
pub fn is_error_reply(reply: &str) -> bool {
    reply.split_whitespace().any(|t| t == "ERR")
}
