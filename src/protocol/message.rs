//! Chat Frame Format
//!
//! Layout:
//! ┌─────────────────────────────────────────────────────┐
//! │ Length prefix (4 bytes, big-endian u32 = N)         │
//! ├─────────────────────────────────────────────────────┤
//! │ Payload (N bytes)                                   │
//! └─────────────────────────────────────────────────────┘
//!
//! Receive-direction payload:
//!
//! ```text
//! <hours>:<minutes>$<body>
//! ```
//!
//! The prefix delimits the frame; `$` delimits fields inside the payload.
//! The body is everything after the first `$`, so it may itself contain
//! `$` or `:`.

use std::fmt;

use crate::error::{Error, Result};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload the length prefix can declare.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

/// Separates the timestamp field from the body.
pub const FIELD_SEPARATOR: u8 = b'$';

/// Separates hours from minutes inside the timestamp field.
pub const TIME_SEPARATOR: u8 = b':';

/// A decoded inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub hours: u32,
    pub minutes: u32,
    pub body: String,
}

impl ChatMessage {
    pub fn new(hours: u32, minutes: u32, body: impl Into<String>) -> Self {
        Self {
            hours,
            minutes,
            body: body.into(),
        }
    }

    /// Parse a frame payload (`HH:MM$body`).
    ///
    /// Hour and minute ranges are not validated. The body is decoded
    /// lossily; the timestamp field must be ASCII digits.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let sep = payload
            .iter()
            .position(|&b| b == FIELD_SEPARATOR)
            .ok_or_else(|| Error::MalformedFrame("missing `$` field separator".into()))?;

        let (stamp, rest) = payload.split_at(sep);
        let (hours, minutes) = parse_timestamp(stamp)?;
        let body = String::from_utf8_lossy(&rest[1..]).into_owned();

        Ok(Self {
            hours,
            minutes,
            body,
        })
    }
}

fn parse_timestamp(stamp: &[u8]) -> Result<(u32, u32)> {
    let stamp = std::str::from_utf8(stamp)
        .map_err(|_| Error::MalformedFrame("timestamp is not valid UTF-8".into()))?;

    let (hours, minutes) = stamp
        .split_once(TIME_SEPARATOR as char)
        .ok_or_else(|| Error::MalformedFrame(format!("timestamp {stamp:?} lacks `:`")))?;

    Ok((parse_field(hours, "hours")?, parse_field(minutes, "minutes")?))
}

fn parse_field(raw: &str, name: &str) -> Result<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedFrame(format!(
            "{name} {raw:?} is not a non-negative integer"
        )));
    }
    raw.parse()
        .map_err(|_| Error::MalformedFrame(format!("{name} {raw:?} overflows")))
}

/// Renders as `[HH:MM]: body`.
impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:02}:{:02}]: {}", self.hours, self.minutes, self.body)
    }
}
