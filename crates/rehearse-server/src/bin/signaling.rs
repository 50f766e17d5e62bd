//! Signaling service binary.
//!
//! Serves the offer/answer/candidate relay with structured logging and
//! graceful shutdown on SIGTERM/SIGINT.

use rehearse_server::{startup, Service};

#[tokio::main]
async fn main() {
    if let Err(e) = startup::run(Service::Signaling).await {
        eprintln!("rehearse-signaling: {e}");
        std::process::exit(1);
    }
}
