//! # muxecho - A Single-Threaded Readiness-Driven Echo Server
//!
//! muxecho demonstrates the reactor pattern: one thread, one poll call,
//! dispatch to per-socket handlers based on readiness events. The same
//! reactor core drives two roles:
//!
//! - an accepting **echo server** that sends every received chunk back with
//!   `" echoed"` appended;
//! - a **client driver** that opens many simultaneous outbound connections,
//!   sends a fixed set of messages on each and waits for the echoes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Reactor                              │
//! │                                                                  │
//! │  ┌────────────────────────┐        ┌──────────────────────────┐  │
//! │  │      Multiplexer       │ ready  │         dispatch         │  │
//! │  │   mio::Poll + tokens   │──────> │                          │  │
//! │  │ Token -> Registration  │        │ Acceptor -> accept       │  │
//! │  └────────────────────────┘        │ Server   -> echo         │  │
//! │              ▲                     │ Client   -> send / recv  │  │
//! │              │ re-arm / unregister └────────────┬─────────────┘  │
//! │              └──────────────────────────────────┘                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use muxecho::{Client, ClientConfig, Server, ServerConfig};
//!
//! # fn main() -> Result<(), muxecho::ReactorError> {
//! let server = Server::bind(&ServerConfig::default())?;
//! let addr = server.local_addr();
//! std::thread::spawn(move || server.run());
//!
//! let config = ClientConfig {
//!     port: addr.port(),
//!     connections: 3,
//!     ..ClientConfig::default()
//! };
//! let report = Client::connect(&config)?.run()?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`reactor`]: the multiplexer, the acceptor and the event loop
//! - [`connection`]: per-connection state and the server/client handlers
//! - [`server`] / [`client`]: role drivers built from a configuration
//! - [`config`]: command-line configuration for both binaries
//!
//! ## Design Highlights
//!
//! ### No Shared State
//!
//! Every connection owns its buffers and is only touched while its own event
//! is dispatched, so the loop needs no locks.
//!
//! ### Level-Triggered Semantics
//!
//! `mio` is edge-triggered. The reactor re-arms each registration after it
//! has been dispatched, so readiness that is still present is reported again.
//! Handlers can therefore do one bounded read or write per event and leave
//! the rest for the next notification.

pub mod client;
pub mod config;
pub mod connection;
pub mod reactor;
pub mod server;
pub mod signal;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Re-export commonly used types for convenience
pub use client::{Client, ClientReport};
pub use config::{ClientConfig, ServerConfig};
pub use connection::{Accounting, ConnectionError, ConnectionStats};
pub use reactor::{ConnectionReport, Exit, Outcome, Reactor, ReactorError, ShutdownHandle};
pub use server::Server;
pub use signal::shutdown_on_ctrl_c;

/// The default port muxecho listens on
pub const DEFAULT_PORT: u16 = 8888;

/// The default host muxecho binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The number of connections the client opens by default
pub const DEFAULT_CONNECTIONS: usize = 50;

/// Literal appended by the server to every received chunk
pub const ECHO_SUFFIX: &[u8] = b" echoed";

/// Messages every client connection sends, in order
pub const MESSAGES: [&[u8]; 2] = [b"Message 1 from client.", b"Message 2 from client."];

/// Version of muxecho
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installs the global `tracing` subscriber.
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
