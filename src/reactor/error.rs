use mio::Token;
use std::io;
use std::net::SocketAddr;

/// Errors that stop a reactor or prevent it from starting.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    /// I/O error from the poll itself
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The token does not belong to a live registration
    #[error("{0:?} is not registered")]
    NotRegistered(Token),

    /// A registration pairs a socket with state of the wrong kind
    #[error("{0:?} pairs a socket with state of the wrong kind")]
    Mismatched(Token),

    /// Binding or listening failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Starting an outbound connection failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The address did not resolve to anything
    #[error("could not resolve address {0}")]
    Resolve(String),
}
