//! Client configuration from command line and environment.

use clap::{ArgAction, Parser};
use tracing::Level;

use crate::network::{ConnectOptions, SessionOptions, DEFAULT_EXIT_WORD, DEFAULT_PORT};
use crate::protocol::MAX_PAYLOAD_LEN;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chatwire",
    about = "Chat with a peer over a length-prefixed TCP connection",
    version
)]
pub struct ClientConfig {
    /// Server host or address; `host:port` overrides --port
    #[arg(env = "CHATWIRE_HOST", default_value = "127.0.0.1")]
    pub destination: String,

    #[arg(long, env = "CHATWIRE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Line that ends the sending side
    #[arg(long, default_value = DEFAULT_EXIT_WORD)]
    pub exit_word: String,

    /// Shut down the write half after the exit word so the peer sees EOF
    #[arg(long)]
    pub half_close: bool,

    /// Skip input lines longer than this many bytes
    #[arg(long, default_value_t = MAX_PAYLOAD_LEN)]
    pub max_line_bytes: usize,

    /// TCP_NODELAY
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub no_delay: bool,

    /// SO_RCVBUF size in bytes
    #[arg(long)]
    pub recv_buffer: Option<usize>,

    /// More log output (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl ClientConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            port: self.port,
            nodelay: self.no_delay,
            recv_buffer: self.recv_buffer,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            exit_word: self.exit_word.clone(),
            half_close_on_exit: self.half_close,
            max_line_len: self.max_line_bytes,
        }
    }

    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
