//! Connection Module
//!
//! Per-connection state and the handlers the reactor dispatches to.
//! A handler never touches the poll or any other connection: it is given the
//! ready directions and the socket, does at most one bounded read and one
//! bounded write, and tells the reactor whether to keep the connection.
//!
//! ## Dispatch
//!
//! ```text
//!        Readiness { readable, writable }
//!                      │
//!                      ▼
//!            ┌──────────────────┐   0 bytes / done   ┌──────────┐
//!            │   on_readable    │ ─────────────────> │  Close   │
//!            └────────┬─────────┘                    └──────────┘
//!                     │ still open
//!                     ▼
//!            ┌──────────────────┐
//!            │   on_writable    │ ──> Continue (re-arm with interest())
//!            └──────────────────┘
//! ```
//!
//! Handlers are generic over `Read`/`Write` so they can be driven by an
//! in-memory socket in tests.

pub mod client;
pub mod echo;
pub mod server;

// Re-export commonly used types
pub use client::{Accounting, ClientConnection};
pub use echo::EchoTracker;
pub use server::ServerConnection;

use crate::reactor::Readiness;
use bytes::{Buf, BytesMut};
use mio::Interest;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound for a single receive
pub const RECV_CHUNK_SIZE: usize = 1024;

/// Upper bound for a single send
pub const SEND_CHUNK_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted or initiated
    pub connections_opened: AtomicU64,
    /// Currently open connections
    pub active_connections: AtomicU64,
    /// Total number of connections closed
    pub connections_closed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// The state attached to a registration.
#[derive(Debug)]
pub enum ConnectionState {
    /// Marks the listening socket
    Acceptor,
    /// An accepted connection being echoed
    Server(ServerConnection),
    /// An outbound connection driven by the client
    Client(ClientConnection),
}

impl ConnectionState {
    pub fn is_acceptor(&self) -> bool {
        matches!(self, ConnectionState::Acceptor)
    }
}

/// What the reactor should do with a connection after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep the registration and re-arm it
    Continue,
    /// Unregister and close the socket
    Close(CloseReason),
}

/// Why a handler asked for its connection to be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer shut down its sending side (zero-length read)
    PeerClosed,
    /// Everything the connection waited for has arrived
    Completed,
}

/// Errors that end a single connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// More bytes arrived than the connection expects in total
    #[error("received {received} bytes but only {expected} were expected")]
    Overrun { expected: usize, received: usize },

    /// The received stream is not an echo of what was sent
    #[error("unexpected byte {byte:#04x} at offset {offset} of the echo stream")]
    UnexpectedEcho { offset: usize, byte: u8 },
}

impl ConnectionError {
    /// True for errors caused by the peer violating the echo contract.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, ConnectionError::IoError(_))
    }
}

/// Readiness callbacks of one connection.
pub trait EventHandler {
    /// Handles a read-ready notification.
    fn on_readable<S: Read>(
        &mut self,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError>;

    /// Handles a write-ready notification.
    fn on_writable<S: Write>(
        &mut self,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError>;

    /// The interest the connection should be re-armed with.
    fn interest(&self) -> Interest;

    /// Runs the read side before the write side. A close on read skips the
    /// write entirely.
    fn dispatch<S: Read + Write>(
        &mut self,
        ready: Readiness,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError> {
        if ready.readable {
            if let Flow::Close(reason) = self.on_readable(socket, stats)? {
                return Ok(Flow::Close(reason));
            }
        }

        if ready.writable {
            return self.on_writable(socket, stats);
        }

        Ok(Flow::Continue)
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Performs one receive of at most [`RECV_CHUNK_SIZE`] bytes, appending to
/// `buffer`.
///
/// Returns `Some(0)` on end of stream and `None` when the socket was not
/// actually ready.
pub(crate) fn recv_chunk<S: Read>(
    socket: &mut S,
    buffer: &mut BytesMut,
) -> io::Result<Option<usize>> {
    let start = buffer.len();
    buffer.resize(start + RECV_CHUNK_SIZE, 0);

    match socket.read(&mut buffer[start..]) {
        Ok(n) => {
            buffer.truncate(start + n);
            Ok(Some(n))
        }
        Err(e) if is_transient(&e) => {
            buffer.truncate(start);
            Ok(None)
        }
        Err(e) => {
            buffer.truncate(start);
            Err(e)
        }
    }
}

/// Performs one send of at most [`SEND_CHUNK_SIZE`] bytes from the front of
/// `pending` and drops whatever the socket accepted.
///
/// Returns the number of bytes sent; `0` when the socket was not ready.
pub(crate) fn send_pending<S: Write>(socket: &mut S, pending: &mut BytesMut) -> io::Result<usize> {
    if pending.is_empty() {
        return Ok(0);
    }

    let end = pending.len().min(SEND_CHUNK_SIZE);
    match socket.write(&pending[..end]) {
        Ok(0) => Err(io::ErrorKind::WriteZero.into()),
        Ok(n) => {
            pending.advance(n);
            Ok(n)
        }
        Err(e) if is_transient(&e) => Ok(0),
        Err(e) => Err(e),
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockSocket;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_recv_chunk_is_bounded() {
        let big = vec![b'x'; RECV_CHUNK_SIZE * 3];
        let mut socket = MockSocket::with_input(&[&big]);
        let mut buffer = BytesMut::new();

        assert_eq!(
            recv_chunk(&mut socket, &mut buffer).unwrap(),
            Some(RECV_CHUNK_SIZE)
        );
        assert_eq!(buffer.len(), RECV_CHUNK_SIZE);
    }

    #[test]
    fn test_recv_chunk_not_ready() {
        let mut socket = MockSocket::default();
        let mut buffer = BytesMut::from(&b"kept"[..]);

        assert_eq!(recv_chunk(&mut socket, &mut buffer).unwrap(), None);
        assert_eq!(&buffer[..], b"kept");
    }

    #[test]
    fn test_recv_chunk_eof() {
        let mut socket = MockSocket {
            eof: true,
            ..MockSocket::default()
        };
        let mut buffer = BytesMut::new();

        assert_eq!(recv_chunk(&mut socket, &mut buffer).unwrap(), Some(0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_send_pending_would_block_keeps_buffer() {
        let mut socket = MockSocket {
            block_writes: true,
            ..MockSocket::default()
        };
        let mut pending = BytesMut::from(&b"payload"[..]);

        assert_eq!(send_pending(&mut socket, &mut pending).unwrap(), 0);
        assert_eq!(&pending[..], b"payload");
    }

    #[test]
    fn test_send_pending_empty_is_noop() {
        let mut socket = MockSocket::default();
        let mut pending = BytesMut::new();

        assert_eq!(send_pending(&mut socket, &mut pending).unwrap(), 0);
        assert_eq!(socket.write_calls, 0);
    }

    #[test]
    fn test_stats_counters() {
        let stats = ConnectionStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();
        stats.bytes_read(10);
        stats.bytes_written(4);

        assert_eq!(stats.connections_opened.load(Ordering::Relaxed), 2);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.connections_closed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 10);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 4);
    }

    proptest! {
        // A socket that takes only `limit` bytes per call still receives the
        // whole buffer, in order, without duplicates.
        #[test]
        fn partial_sends_are_gapless(
            data in proptest::collection::vec(any::<u8>(), 1..6000),
            limit in 1usize..700,
        ) {
            let mut socket = MockSocket {
                write_limit: Some(limit),
                ..MockSocket::default()
            };
            let mut pending = BytesMut::from(&data[..]);

            while !pending.is_empty() {
                let sent = send_pending(&mut socket, &mut pending).unwrap();
                prop_assert!(sent > 0 && sent <= limit.min(SEND_CHUNK_SIZE));
            }

            prop_assert_eq!(socket.written, data);
        }
    }
}
