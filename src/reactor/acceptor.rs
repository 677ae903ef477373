//! The listening socket's branch of the dispatch.

use super::{Multiplexer, ReactorError, Socket};
use crate::connection::{ConnectionState, ConnectionStats, ServerConnection};
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// What one accept attempt left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcceptState {
    /// A connection was accepted and registered
    Accepted(Token),
    /// Nothing was pending
    Drained,
    /// The pending connection went away before it could be accepted
    Dropped,
    /// The process is out of descriptors or buffers. Accepting again before
    /// something is released would fail the same way.
    Starved,
}

impl AcceptState {
    /// True when the listener should be re-armed right away.
    pub(crate) fn keep_armed(self) -> bool {
        !matches!(self, AcceptState::Starved)
    }
}

/// Binds a non-blocking listener.
pub(crate) fn bind(addr: SocketAddr) -> Result<TcpListener, ReactorError> {
    TcpListener::bind(addr).map_err(|source| ReactorError::Bind { addr, source })
}

/// Accepts at most one pending connection on the listener registered under
/// `listener` and registers it for read and write.
///
/// Further pending connections are picked up on later notifications.
pub(crate) fn accept_one(
    mux: &mut Multiplexer,
    listener: Token,
    stats: &ConnectionStats,
) -> Result<AcceptState, ReactorError> {
    let accepted = match mux.get_mut(listener).map(|r| &r.socket) {
        Some(Socket::Listener(socket)) => socket.accept(),
        Some(Socket::Stream(_)) => return Err(ReactorError::Mismatched(listener)),
        None => return Err(ReactorError::NotRegistered(listener)),
    };

    register_accepted(mux, accepted, stats)
}

fn register_accepted(
    mux: &mut Multiplexer,
    accepted: io::Result<(TcpStream, SocketAddr)>,
    stats: &ConnectionStats,
) -> Result<AcceptState, ReactorError> {
    match accepted {
        Ok((stream, peer)) => {
            info!(peer = %peer, "Accepted connection");
            match mux.register(
                Socket::Stream(stream),
                Interest::READABLE | Interest::WRITABLE,
                ConnectionState::Server(ServerConnection::new(peer)),
            ) {
                Ok(token) => {
                    stats.connection_opened();
                    Ok(AcceptState::Accepted(token))
                }
                Err(ReactorError::Io(e)) => {
                    warn!(peer = %peer, error = %e, "Failed to register connection");
                    Ok(AcceptState::Dropped)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(AcceptState::Drained),
        Err(e) if is_per_connection(&e) => {
            debug!(error = %e, "Pending connection dropped before accept");
            Ok(AcceptState::Dropped)
        }
        Err(e) => {
            warn!(error = %e, "Failed to accept connection, pausing listener");
            Ok(AcceptState::Starved)
        }
    }
}

/// Accept errors that concern only the connection being accepted.
fn is_per_connection(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
    )
}
