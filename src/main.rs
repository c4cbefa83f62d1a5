// Keyvault — Application Entry Point
//
// Parses CLI arguments, initializes structured logging (with a filter that
// never emits key material) on stderr, and dispatches to the command handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keyvault::cli::{execute, Cli};

fn main() {
    // RUST_LOG=keyvault=debug for verbose output. The default level is
    // `info`, which never includes key material.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyvault=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
