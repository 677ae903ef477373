//! muxecho-client - opens many concurrent connections to a muxecho server
//! over a single poll loop and waits for every echo.

use anyhow::{bail, Context};
use clap::Parser;
use muxecho::{init_tracing, shutdown_on_ctrl_c, Client, ClientConfig, Outcome};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = ClientConfig::parse();
    init_tracing();

    info!(
        server = %config.server_address(),
        connections = config.connections,
        accounting = ?config.accounting,
        "Starting client"
    );

    let mut client = Client::connect(&config)
        .with_context(|| format!("failed to connect to {}", config.server_address()))?;
    let _signal = shutdown_on_ctrl_c(client.shutdown_handle())
        .context("failed to install Ctrl+C handler")?;

    let report = client.run().context("reactor loop failed")?;

    for connection in &report.connections {
        if connection.outcome != Outcome::Completed {
            println!(
                "connection {}: {:?} ({} messages sent, {} bytes received)",
                connection.id, connection.outcome, connection.messages_sent, connection.bytes_received
            );
        }
    }
    println!(
        "{} of {} connections completed",
        report.completed(),
        report.connections.len()
    );

    if !report.is_success() {
        bail!(
            "{} of {} connections did not complete",
            report.connections.len() - report.completed(),
            report.connections.len()
        );
    }
    Ok(())
}
