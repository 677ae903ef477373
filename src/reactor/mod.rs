//! Reactor Module
//!
//! The single-threaded event loop shared by the server and the client.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Reactor                              │
//! │                                                              │
//! │   loop {                                                     │
//! │       ready = multiplexer.poll(timeout)                      │
//! │       for each ready token:                                  │
//! │           Acceptor  ──> accept one, register R|W             │
//! │           Server    ──> ServerConnection::dispatch           │
//! │           Client    ──> ClientConnection::dispatch           │
//! │           Close     ──> unregister, drop socket              │
//! │           Continue  ──> re-arm with the handler's interest   │
//! │   }                                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! The [`Multiplexer`] owns every socket and its [`ConnectionState`]. The
//! [`Reactor`] owns the multiplexer. Nothing lives in globals; a
//! [`ShutdownHandle`] is the only piece that crosses threads.
//!
//! [`ConnectionState`]: crate::connection::ConnectionState

mod acceptor;
pub mod error;
pub mod event_loop;
pub mod multiplexer;

// Re-export commonly used types
pub use error::ReactorError;
pub use event_loop::{ConnectionReport, Exit, Outcome, Reactor};
pub use multiplexer::{
    Multiplexer, Readiness, Registration, ShutdownHandle, Socket, DEFAULT_EVENTS_CAPACITY,
};
