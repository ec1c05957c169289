//! Protocol Layer: Length-Prefixed Chat Frames
//!
//! Prinsip desain:
//! - Length prefix delimits the frame, never a terminator scan
//! - In-band `$` and `:` only structure the payload of one frame
//! - One reusable buffer per direction

mod encoder;
mod message;

pub use encoder::{length_prefix, Decoder, Encoder};
pub use message::{
    ChatMessage, FIELD_SEPARATOR, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_LEN, TIME_SEPARATOR,
};
