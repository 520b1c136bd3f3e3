//! Channel registration errors

use crate::protocol::record::Modality;

/// Error type for channel registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A sink is already registered for this modality
    AlreadyRegistered(Modality),
    /// Declared sample size differs from the modality's arity
    ShapeMismatch {
        modality: Modality,
        expected: usize,
        declared: usize,
    },
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::AlreadyRegistered(modality) => {
                write!(f, "Channel already registered for {}", modality)
            }
            ChannelError::ShapeMismatch {
                modality,
                expected,
                declared,
            } => write!(
                f,
                "Channel for {} declares {} values, records carry {}",
                modality, declared, expected
            ),
        }
    }
}

impl std::error::Error for ChannelError {}
