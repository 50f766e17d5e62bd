//! Agent session service binary.

use rehearse_server::{startup, Service};

#[tokio::main]
async fn main() {
    if let Err(e) = startup::run(Service::Agent).await {
        eprintln!("rehearse-agent: {e}");
        std::process::exit(1);
    }
}
