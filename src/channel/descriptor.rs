//! Channel descriptors
//!
//! A descriptor names the downstream stream a modality is delivered to and
//! declares its shape. The surrounding system registers one per enabled
//! modality before streaming starts.

use std::fmt;

use crate::protocol::record::Modality;

/// Element type of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Int32,
    Float32,
}

/// Declaration of one downstream channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    /// Device name (e.g., "ACC-empatica_e4")
    pub device_name: String,
    /// Stream name within the device (e.g., "acc-values")
    pub stream_name: String,
    /// Element type
    pub sample_type: SampleType,
    /// Values per sample
    pub sample_size: usize,
    /// Nominal sampling rate in Hz
    pub nominal_rate_hz: f64,
    /// Per-value column headings
    pub headings: Vec<String>,
}

impl ChannelDescriptor {
    /// Create a descriptor with no headings
    pub fn new(
        device_name: impl Into<String>,
        stream_name: impl Into<String>,
        sample_type: SampleType,
        sample_size: usize,
        nominal_rate_hz: f64,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            stream_name: stream_name.into(),
            sample_type,
            sample_size,
            nominal_rate_hz,
            headings: Vec::new(),
        }
    }

    /// Set column headings
    pub fn with_headings<I, S>(mut self, headings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headings = headings.into_iter().map(Into::into).collect();
        self
    }

    /// Standard channel for an E4 modality
    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Acceleration => {
                Self::new("ACC-empatica_e4", "acc-values", SampleType::Int32, 3, 32.0)
                    .with_headings(["acc_x", "acc_y", "acc_z"])
            }
            Modality::Bvp => Self::new("BVP-empatica_e4", "bvp-values", SampleType::Float32, 1, 64.0)
                .with_headings(["bvp"]),
            Modality::Gsr => Self::new("GSR-empatica_e4", "gsr-values", SampleType::Float32, 1, 4.0)
                .with_headings(["gsr"]),
            Modality::Temperature => {
                Self::new("Tmp-empatica_e4", "tmp-values", SampleType::Float32, 1, 4.0)
                    .with_headings(["tmp"])
            }
        }
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_name, self.stream_name)
    }
}
