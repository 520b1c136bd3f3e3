//! Streaming record parser
//!
//! Each record is one line of space-separated tokens:
//!
//! ```text
//! <tag> <timestamp> <v1> [v2 v3]
//! ```
//!
//! The tag selects the modality and therefore the payload arity. The bridge
//! formats decimals with the host locale, so both `.` and `,` appear as the
//! fractional separator. Parsing is stateless per line, so a garbled line
//! never affects the next one.

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;
use std::str::SplitWhitespace;

use crate::error::ParseError;
use crate::protocol::constants::*;

/// Physiological signal streamed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    /// 3-axis acceleration
    Acceleration,
    /// Blood volume pulse
    Bvp,
    /// Galvanic skin response (electrodermal activity)
    Gsr,
    /// Skin temperature
    Temperature,
}

impl Modality {
    /// All modalities, in subscription order
    pub const ALL: [Modality; 4] = [
        Modality::Acceleration,
        Modality::Bvp,
        Modality::Gsr,
        Modality::Temperature,
    ];

    /// Dense index, usable for per-modality tables
    pub const fn index(self) -> usize {
        match self {
            Modality::Acceleration => 0,
            Modality::Bvp => 1,
            Modality::Gsr => 2,
            Modality::Temperature => 3,
        }
    }

    /// Record tag as it appears on the wire
    pub const fn tag(self) -> &'static str {
        match self {
            Modality::Acceleration => TAG_ACC,
            Modality::Bvp => TAG_BVP,
            Modality::Gsr => TAG_GSR,
            Modality::Temperature => TAG_TEMPERATURE,
        }
    }

    /// Name used in `device_subscribe <name> ON`
    pub const fn subscription_name(self) -> &'static str {
        match self {
            Modality::Acceleration => SUBSCRIBE_ACC,
            Modality::Bvp => SUBSCRIBE_BVP,
            Modality::Gsr => SUBSCRIBE_GSR,
            Modality::Temperature => SUBSCRIBE_TEMPERATURE,
        }
    }

    /// Number of payload values per record
    pub const fn arity(self) -> usize {
        match self {
            Modality::Acceleration => 3,
            Modality::Bvp | Modality::Gsr | Modality::Temperature => 1,
        }
    }

    /// Look up a modality from its record tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TAG_ACC => Some(Modality::Acceleration),
            TAG_BVP => Some(Modality::Bvp),
            TAG_GSR => Some(Modality::Gsr),
            TAG_TEMPERATURE => Some(Modality::Temperature),
            _ => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Modality-specific payload with its fixed arity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Raw accelerometer counts
    Acceleration { x: i32, y: i32, z: i32 },
    Bvp(f64),
    /// Microsiemens
    Gsr(f64),
    /// Degrees Celsius
    Temperature(f64),
}

impl Reading {
    pub fn modality(&self) -> Modality {
        match self {
            Reading::Acceleration { .. } => Modality::Acceleration,
            Reading::Bvp(_) => Modality::Bvp,
            Reading::Gsr(_) => Modality::Gsr,
            Reading::Temperature(_) => Modality::Temperature,
        }
    }

    /// Payload flattened to numbers, in wire order
    pub fn values(&self) -> Values {
        match *self {
            Reading::Acceleration { x, y, z } => Values {
                buf: [x as f64, y as f64, z as f64],
                len: 3,
            },
            Reading::Bvp(v) | Reading::Gsr(v) | Reading::Temperature(v) => Values {
                buf: [v, 0.0, 0.0],
                len: 1,
            },
        }
    }
}

/// Flattened payload, dereferences to `&[f64]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Values {
    buf: [f64; 3],
    len: usize,
}

impl Deref for Values {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.buf[..self.len]
    }
}

/// One timestamped sample of one modality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Device timestamp in seconds
    pub timestamp_seconds: f64,
    pub reading: Reading,
}

impl Sample {
    pub fn new(timestamp_seconds: f64, reading: Reading) -> Self {
        Self {
            timestamp_seconds,
            reading,
        }
    }

    pub fn modality(&self) -> Modality {
        self.reading.modality()
    }

    pub fn values(&self) -> Values {
        self.reading.values()
    }
}

/// Parse one streaming record
pub fn parse(line: &str) -> Result<Sample, ParseError> {
    let mut tokens = line.split_whitespace();

    let tag = tokens.next().ok_or_else(|| malformed(line, "empty record"))?;
    let modality =
        Modality::from_tag(tag).ok_or_else(|| ParseError::UnknownTag(tag.to_owned()))?;

    let timestamp_seconds = tokens
        .next()
        .ok_or_else(|| malformed(line, "missing timestamp"))
        .and_then(|t| parse_decimal(t).ok_or_else(|| malformed(line, "invalid timestamp")))?;
    if !timestamp_seconds.is_finite() {
        return Err(malformed(line, "non-finite timestamp"));
    }

    let reading = match modality {
        Modality::Acceleration => Reading::Acceleration {
            x: next_integer(&mut tokens, line)?,
            y: next_integer(&mut tokens, line)?,
            z: next_integer(&mut tokens, line)?,
        },
        Modality::Bvp => Reading::Bvp(next_decimal(&mut tokens, line)?),
        Modality::Gsr => Reading::Gsr(next_decimal(&mut tokens, line)?),
        Modality::Temperature => Reading::Temperature(next_decimal(&mut tokens, line)?),
    };

    if tokens.next().is_some() {
        return Err(malformed(line, "too many values"));
    }

    Ok(Sample::new(timestamp_seconds, reading))
}

/// Normalize a `,` decimal separator to `.`
fn normalize(token: &str) -> Cow<'_, str> {
    if token.contains(',') {
        Cow::Owned(token.replace(',', "."))
    } else {
        Cow::Borrowed(token)
    }
}

fn parse_decimal(token: &str) -> Option<f64> {
    normalize(token).parse().ok()
}

fn next_decimal(tokens: &mut SplitWhitespace<'_>, line: &str) -> Result<f64, ParseError> {
    let token = tokens.next().ok_or_else(|| malformed(line, "missing value"))?;
    parse_decimal(token).ok_or_else(|| malformed(line, "non-numeric value"))
}

fn next_integer(tokens: &mut SplitWhitespace<'_>, line: &str) -> Result<i32, ParseError> {
    let token = tokens.next().ok_or_else(|| malformed(line, "missing value"))?;
    normalize(token)
        .parse()
        .map_err(|_| malformed(line, "non-integer value"))
}

fn malformed(line: &str, reason: &'static str) -> ParseError {
    ParseError::Malformed {
        line: line.to_owned(),
        reason,
    }
}
