//! Server-side connection handler.
//!
//! ```text
//! OPEN ──read gives 0 bytes──> CLOSING ──unregister + close──> CLOSED
//! ```
//!
//! Every received chunk is queued back with [`ECHO_SUFFIX`] appended. There is
//! no framing: the suffix follows each chunk as the socket delivered it, not
//! each message the peer meant to send.

use super::{recv_chunk, send_pending, CloseReason, ConnectionError, ConnectionStats};
use super::{EventHandler, Flow, RECV_CHUNK_SIZE};
use crate::ECHO_SUFFIX;
use bytes::BytesMut;
use mio::Interest;
use std::io::{Read, Write};
use std::net::SocketAddr;
use tracing::{info, trace};

/// State of one accepted connection.
#[derive(Debug)]
pub struct ServerConnection {
    /// Client's address (for logging)
    peer: SocketAddr,

    /// Bytes of the chunk currently being received
    inbound: BytesMut,

    /// Echo bytes not yet accepted by the socket
    outbound: BytesMut,
}

impl ServerConnection {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            inbound: BytesMut::with_capacity(RECV_CHUNK_SIZE),
            outbound: BytesMut::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Echo bytes still waiting to be sent
    pub fn pending(&self) -> &[u8] {
        &self.outbound
    }
}

impl EventHandler for ServerConnection {
    fn on_readable<S: Read>(
        &mut self,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError> {
        match recv_chunk(socket, &mut self.inbound)? {
            None => Ok(Flow::Continue),
            Some(0) => Ok(Flow::Close(CloseReason::PeerClosed)),
            Some(n) => {
                stats.bytes_read(n);
                trace!(peer = %self.peer, bytes = n, "Read data");

                self.outbound.extend_from_slice(&self.inbound);
                self.outbound.extend_from_slice(ECHO_SUFFIX);
                self.inbound.clear();
                Ok(Flow::Continue)
            }
        }
    }

    fn on_writable<S: Write>(
        &mut self,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError> {
        if self.outbound.is_empty() {
            return Ok(Flow::Continue);
        }

        info!(peer = %self.peer, payload = ?self.outbound, "Echoing");
        let sent = send_pending(socket, &mut self.outbound)?;
        if sent > 0 {
            stats.bytes_written(sent);
            trace!(
                peer = %self.peer,
                bytes = sent,
                remaining = self.outbound.len(),
                "Sent data"
            );
        }

        Ok(Flow::Continue)
    }

    fn interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockSocket;
    use crate::reactor::Readiness;
    use mio::Token;
    use std::sync::atomic::Ordering;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn read_only() -> Readiness {
        Readiness::new(Token(1), true, false)
    }

    fn write_only() -> Readiness {
        Readiness::new(Token(1), false, true)
    }

    fn both() -> Readiness {
        Readiness::new(Token(1), true, true)
    }

    #[test]
    fn test_echo_in_same_event() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"hi"]);

        let flow = conn.dispatch(both(), &mut socket, &stats).unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(socket.written, b"hi echoed");
        assert!(conn.pending().is_empty());
    }

    #[test]
    fn test_suffix_per_received_chunk() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"ab", b"cd"]);

        conn.dispatch(read_only(), &mut socket, &stats).unwrap();
        conn.dispatch(read_only(), &mut socket, &stats).unwrap();
        assert_eq!(conn.pending(), b"ab echoedcd echoed");

        conn.dispatch(write_only(), &mut socket, &stats).unwrap();
        assert_eq!(socket.written, b"ab echoedcd echoed");
    }

    #[test]
    fn test_zero_read_closes_without_writing() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"x"]);

        conn.dispatch(read_only(), &mut socket, &stats).unwrap();
        socket.eof = true;

        let flow = conn.dispatch(both(), &mut socket, &stats).unwrap();

        assert_eq!(flow, Flow::Close(CloseReason::PeerClosed));
        assert_eq!(socket.write_calls, 0);
    }

    #[test]
    fn test_partial_send_keeps_unsent_suffix() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"hello"]);
        socket.write_limit = Some(3);

        conn.dispatch(read_only(), &mut socket, &stats).unwrap();

        conn.dispatch(write_only(), &mut socket, &stats).unwrap();
        assert_eq!(socket.written, b"hel");
        assert_eq!(conn.pending(), b"lo echoed");

        while !conn.pending().is_empty() {
            conn.dispatch(write_only(), &mut socket, &stats).unwrap();
        }

        assert_eq!(socket.written, b"hello echoed");
        assert_eq!(socket.write_calls, 4);
    }

    #[test]
    fn test_write_would_block_is_deferred() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"hi"]);
        socket.block_writes = true;

        let flow = conn.dispatch(both(), &mut socket, &stats).unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(conn.pending(), b"hi echoed");
    }

    #[test]
    fn test_spurious_read_is_not_eof() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::default();

        let flow = conn.dispatch(read_only(), &mut socket, &stats).unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn test_interest_follows_pending_output() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"ping"]);
        assert_eq!(conn.interest(), Interest::READABLE);

        conn.dispatch(read_only(), &mut socket, &stats).unwrap();
        assert_eq!(conn.interest(), Interest::READABLE | Interest::WRITABLE);

        conn.dispatch(write_only(), &mut socket, &stats).unwrap();
        assert_eq!(conn.interest(), Interest::READABLE);
    }

    #[test]
    fn test_connections_do_not_share_buffers() {
        let stats = ConnectionStats::new();
        let mut a = ServerConnection::new(peer());
        let mut b = ServerConnection::new("127.0.0.1:40001".parse().unwrap());
        let mut socket_a = MockSocket::with_input(&[b"aaa", b"AAA"]);
        let mut socket_b = MockSocket::with_input(&[b"bbb"]);

        a.dispatch(read_only(), &mut socket_a, &stats).unwrap();
        b.dispatch(both(), &mut socket_b, &stats).unwrap();
        a.dispatch(both(), &mut socket_a, &stats).unwrap();

        assert_eq!(socket_a.written, b"aaa echoedAAA echoed");
        assert_eq!(socket_b.written, b"bbb echoed");
    }

    #[test]
    fn test_stats_track_bytes() {
        let stats = ConnectionStats::new();
        let mut conn = ServerConnection::new(peer());
        let mut socket = MockSocket::with_input(&[b"hi"]);

        conn.dispatch(both(), &mut socket, &stats).unwrap();

        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 2);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 9);
    }
}
