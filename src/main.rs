//! Chatwire client binary.
//!
//! Reads lines from stdin, prints received messages to stdout, logs to
//! stderr.
//!
//! # Usage
//!
//! ```text
//! cargo run --release -- 127.0.0.1 --port 12345
//! ```

use std::io::{self, BufReader};
use std::process::ExitCode;

use clap::Parser;

use chatwire::config::ClientConfig;
use chatwire::network::{self, Session};

fn main() -> ExitCode {
    let config = ClientConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_writer(io::stderr)
        .init();

    let connect_options = config.connect_options();
    let report = Session::start(
        |destination| network::connect(destination, &connect_options),
        &config.destination,
        config.session_options(),
        BufReader::new(io::stdin()),
        io::stdout(),
    );

    match report {
        Ok(report) => {
            for error in report.errors() {
                tracing::warn!(%error, "session ended with an error");
            }
            tracing::info!(
                sent = report.frames_sent,
                received = report.messages_rendered,
                dropped = report.frames_dropped,
                "session closed"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start session");
            ExitCode::FAILURE
        }
    }
}
