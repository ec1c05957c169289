//! Chatwire - Duplex Line Chat Client
//!
//! Arsitektur:
//! - Framing: 4-byte big-endian length prefix + `HH:MM$body` payload
//! - Duplex: one blocking sender thread, one blocking receiver thread
//! - Teardown: both threads joined before the connection is released

pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

pub use error::{Error, Result};
