//! muxecho - Single-Threaded Readiness-Driven Echo Server
//!
//! This is the main entry point for the muxecho server.
//! It binds the listener, installs the Ctrl+C handler and runs the reactor.

use anyhow::Context;
use clap::Parser;
use muxecho::{init_tracing, shutdown_on_ctrl_c, Server, ServerConfig};
use tracing::info;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
muxecho v{} - Readiness-Driven Echo Server
──────────────────────────────────────────────
Server starting on {}
One thread, one poll, every connection.

Use Ctrl+C to shutdown gracefully.
"#,
        muxecho::VERSION,
        config.bind_address()
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = ServerConfig::parse();

    // Set up logging
    init_tracing();

    // Print the banner
    print_banner(&config);

    // Bind the listener and register it with the reactor
    let server = Server::bind(&config)
        .with_context(|| format!("failed to start server on {}", config.bind_address()))?;

    // Set up graceful shutdown
    let _signal = shutdown_on_ctrl_c(server.shutdown_handle())
        .context("failed to install Ctrl+C handler")?;

    info!(address = %server.local_addr(), "Starting server");
    server.run().context("reactor loop failed")?;

    info!("Server shutdown complete");
    Ok(())
}
