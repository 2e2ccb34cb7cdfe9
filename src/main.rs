//! indexgate CLI entry point
//!
//! Installs the `tracing` subscriber used for HTTP access logs, then hands
//! everything else to the CLI module. Errors go to stderr with a non-zero
//! exit.

use indexgate::cli;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("indexgate=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
