//! Network Layer: Blocking Duplex Session
//!
//! Satu thread per arah:
//! - Sender: local lines → frames → socket
//! - Receiver: socket → frames → rendered lines
//!
//! Both threads share one connection through split handles.

mod connection;
mod session;

pub use connection::{connect, resolve, ConnectOptions, Transport, DEFAULT_PORT};
pub use session::{
    receive_messages, send_lines, ReceiverExit, SenderExit, Session, SessionOptions,
    SessionReport, SessionState, SessionStats, StateHandle, DEFAULT_EXIT_WORD,
};
