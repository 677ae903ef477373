//! Graceful shutdown on Ctrl+C.

use crate::reactor::ShutdownHandle;
use std::io;
use std::thread::{self, JoinHandle};
use tokio::signal;
use tracing::{error, info};

/// Fires `handle` when the process receives Ctrl+C.
///
/// The wait runs on its own thread with a current-thread Tokio runtime; the
/// reactor itself stays on the caller's thread and only sees the wake-up.
pub fn shutdown_on_ctrl_c(handle: ShutdownHandle) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Shutdown signal received, stopping...");
                        handle.shutdown();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
                }
            });
        })
}
