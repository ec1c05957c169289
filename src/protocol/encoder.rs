//! Frame Encoder/Decoder
//!
//! `Encoder` writes frames into a reusable buffer; one allocation serves the
//! whole session. `Decoder` pulls frames off any `Read` with exact two-phase
//! reads (prefix, then payload), so it never consumes past a frame boundary.

use std::io::{self, Read, Write};

use super::message::{ChatMessage, FIELD_SEPARATOR, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_LEN};
use crate::error::{Error, Result};

/// Initial encoder capacity, sized for a typical console line.
const DEFAULT_CAPACITY: usize = 1024;

/// Build the big-endian length prefix for a payload of `len` bytes.
#[inline]
pub fn length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    if len > MAX_PAYLOAD_LEN {
        return Err(Error::MessageTooLarge {
            len,
            limit: MAX_PAYLOAD_LEN,
        });
    }
    Ok((len as u32).to_be_bytes())
}

/// Reusable frame encoder
pub struct Encoder {
    buffer: Vec<u8>,
    max_payload: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            max_payload: MAX_PAYLOAD_LEN,
        }
    }

    /// Cap payloads below the 32-bit field width.
    pub fn with_limit(max_payload: usize) -> Self {
        let mut encoder = Self::new();
        encoder.max_payload = max_payload.min(MAX_PAYLOAD_LEN);
        encoder
    }

    #[inline]
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn prefix_for(&self, len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
        if len > self.max_payload {
            return Err(Error::MessageTooLarge {
                len,
                limit: self.max_payload,
            });
        }
        length_prefix(len)
    }

    /// Reset encoder untuk reuse
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Encode an outbound line: length prefix followed by the raw bytes.
    ///
    /// The client never stamps its own messages. On error the buffer is left
    /// empty, so nothing can reach the wire.
    pub fn encode(&mut self, message: impl AsRef<[u8]>) -> Result<&[u8]> {
        let message = message.as_ref();
        self.reset();
        let prefix = self.prefix_for(message.len())?;

        self.buffer.reserve(LENGTH_PREFIX_SIZE + message.len());
        self.buffer.extend_from_slice(&prefix);
        self.buffer.extend_from_slice(message);

        Ok(&self.buffer)
    }

    /// Encode a receive-direction frame carrying `HH:MM$body`.
    ///
    /// This is what a peer sends back to the client.
    pub fn encode_stamped(&mut self, hours: u32, minutes: u32, body: &str) -> Result<&[u8]> {
        self.reset();
        self.buffer.extend_from_slice(&[0; LENGTH_PREFIX_SIZE]);
        write!(self.buffer, "{hours:02}:{minutes:02}")?;
        self.buffer.push(FIELD_SEPARATOR);
        self.buffer.extend_from_slice(body.as_bytes());

        let payload_len = self.buffer.len() - LENGTH_PREFIX_SIZE;
        match self.prefix_for(payload_len) {
            Ok(prefix) => {
                self.buffer[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
                Ok(&self.buffer)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Get current buffer content
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Streaming frame decoder
pub struct Decoder<R> {
    reader: R,
    payload: Vec<u8>,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            payload: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Read the next raw payload.
    ///
    /// Returns `Ok(None)` when the peer closes before a complete length
    /// prefix, and `TruncatedFrame` when it closes inside a payload.
    pub fn next_payload(&mut self) -> Result<Option<&[u8]>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let filled = fill(&mut self.reader, &mut prefix)?;
        if filled < LENGTH_PREFIX_SIZE {
            if filled > 0 {
                tracing::debug!(filled, "stream ended inside a length prefix");
            }
            return Ok(None);
        }

        let declared = u32::from_be_bytes(prefix);

        // `take` grows the buffer as bytes arrive instead of trusting the
        // declared length for one up-front allocation.
        self.payload.clear();
        let received = self
            .reader
            .by_ref()
            .take(u64::from(declared))
            .read_to_end(&mut self.payload)?;

        if received < declared as usize {
            return Err(Error::TruncatedFrame {
                expected: declared,
                received,
            });
        }

        Ok(Some(&self.payload))
    }

    /// Read and parse the next chat message.
    ///
    /// A `MalformedFrame` error consumes exactly one frame; the next call
    /// continues with the following one.
    pub fn next_message(&mut self) -> Result<Option<ChatMessage>> {
        match self.next_payload()? {
            Some(payload) => ChatMessage::parse(payload).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

}

/// Read until `buf` is full or the stream ends; returns bytes filled.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
