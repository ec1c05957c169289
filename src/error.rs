//! Error types for chatwire.

use std::io;

use thiserror::Error;

/// Main error type for codec and session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach the destination at startup.
    #[error("failed to connect to {destination}: {source}")]
    Connect {
        destination: String,
        #[source]
        source: io::Error,
    },

    /// Destination resolved to no usable address.
    #[error("destination {0} resolved to no address")]
    Resolve(String),

    /// Socket read/write failure on an established connection.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// Peer closed the connection in the middle of a frame payload.
    #[error("truncated frame: expected {expected} payload bytes, received {received}")]
    TruncatedFrame { expected: u32, received: usize },

    /// Payload did not carry the `HH:MM$body` structure.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Outbound message exceeds the encoder limit (at most the 32-bit
    /// length field).
    #[error("message too large: {len} bytes exceeds the {limit}-byte limit")]
    MessageTooLarge { len: usize, limit: usize },

    /// The local line source failed.
    #[error("input error: {0}")]
    Input(#[source] io::Error),

    /// The rendered-output sink failed.
    #[error("render error: {0}")]
    Render(#[source] io::Error),
}

impl Error {
    /// Whether the error ends the activity that hit it.
    ///
    /// A malformed payload leaves the stream aligned (the length prefix was
    /// already honored) and an oversized outbound message is never written,
    /// so both leave the connection usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedFrame(_) | Error::MessageTooLarge { .. })
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
