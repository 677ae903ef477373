use super::acceptor::{self, AcceptState};
use super::{Multiplexer, Readiness, ReactorError, Registration, ShutdownHandle, Socket};
use crate::connection::{
    ClientConnection, CloseReason, ConnectionError, ConnectionState, ConnectionStats,
    EventHandler, Flow,
};
use mio::net::TcpStream;
use mio::{Interest, Token};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Longest a starved listener waits before it is re-armed
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// Why [`Reactor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// No registrations were left
    Drained,
    /// A poll with a finite timeout came back empty
    Idle,
    /// The shutdown handle fired
    Shutdown,
}

/// How a client connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Everything expected arrived
    Completed,
    /// The server closed first
    PeerClosed,
    /// Still open when the loop stopped
    Unfinished,
    /// An I/O or protocol error ended the connection
    Failed(String),
}

impl From<CloseReason> for Outcome {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Completed => Outcome::Completed,
            CloseReason::PeerClosed => Outcome::PeerClosed,
        }
    }
}

/// Summary of a closed client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub id: usize,
    pub messages_sent: usize,
    pub bytes_received: usize,
    pub outcome: Outcome,
}

/// One thread, one poll, dispatch by connection state.
#[derive(Debug)]
pub struct Reactor {
    mux: Multiplexer,
    stats: Arc<ConnectionStats>,
    reports: Vec<ConnectionReport>,
    /// Listeners left un-armed after running out of resources
    starved: Vec<Token>,
}

impl Reactor {
    /// Creates a reactor fetching at most `events_capacity` events per poll.
    pub fn new(events_capacity: usize) -> Result<Self, ReactorError> {
        Ok(Self {
            mux: Multiplexer::new(events_capacity)?,
            stats: Arc::new(ConnectionStats::new()),
            reports: Vec::new(),
            starved: Vec::new(),
        })
    }

    /// Binds a listener on `addr` and registers it as the acceptor.
    ///
    /// Returns the bound address, which differs from `addr` for port 0.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<SocketAddr, ReactorError> {
        let listener = acceptor::bind(addr)?;
        let local_addr = listener.local_addr()?;

        self.mux.register(
            Socket::Listener(listener),
            Interest::READABLE,
            ConnectionState::Acceptor,
        )?;
        Ok(local_addr)
    }

    /// Starts a non-blocking connect to `addr` driven by `connection`.
    pub fn connect(
        &mut self,
        addr: SocketAddr,
        connection: ClientConnection,
    ) -> Result<Token, ReactorError> {
        info!(id = connection.id(), server = %addr, "Starting connection");

        let stream =
            TcpStream::connect(addr).map_err(|source| ReactorError::Connect { addr, source })?;
        let token = self.mux.register(
            Socket::Stream(stream),
            Interest::READABLE | Interest::WRITABLE,
            ConnectionState::Client(connection),
        )?;
        self.stats.connection_opened();
        Ok(token)
    }

    /// Drives the poll until shutdown, until nothing is registered, or, with
    /// a finite `timeout`, until a poll comes back empty.
    ///
    /// Every registration still present when the loop stops is closed.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<Exit, ReactorError> {
        let exit = loop {
            if self.mux.shutdown_requested() {
                break Exit::Shutdown;
            }
            if self.mux.is_empty() {
                break Exit::Drained;
            }

            let wait = self.poll_timeout(timeout);
            let ready = self.mux.poll(wait)?;
            if ready.is_empty() {
                if !self.starved.is_empty() {
                    self.resume_listeners()?;
                    continue;
                }
                if timeout.is_some() && !self.mux.shutdown_requested() {
                    break Exit::Idle;
                }
            }

            for readiness in ready {
                self.dispatch(readiness)?;
            }
        };

        debug!(?exit, "Reactor loop stopped");
        self.teardown();
        Ok(exit)
    }

    /// Caps the wait while a listener is starved so it gets another chance
    /// even if no connection closes.
    fn poll_timeout(&self, timeout: Option<Duration>) -> Option<Duration> {
        if self.starved.is_empty() {
            timeout
        } else {
            Some(timeout.map_or(ACCEPT_RETRY, |t| t.min(ACCEPT_RETRY)))
        }
    }

    fn dispatch(&mut self, ready: Readiness) -> Result<(), ReactorError> {
        let Some(registration) = self.mux.get_mut(ready.token) else {
            trace!(token = ready.token.0, "Skipping event for closed connection");
            return Ok(());
        };

        if registration.state.is_acceptor() {
            let state = acceptor::accept_one(&mut self.mux, ready.token, &self.stats)?;
            return self.after_accept(ready.token, state);
        }

        let Registration { socket, state, .. } = registration;
        let outcome = match (socket, state) {
            (Socket::Stream(stream), ConnectionState::Server(conn)) => conn
                .dispatch(ready, stream, &self.stats)
                .map(|flow| (flow, conn.interest())),
            (Socket::Stream(stream), ConnectionState::Client(conn)) => conn
                .dispatch(ready, stream, &self.stats)
                .map(|flow| (flow, conn.interest())),
            _ => return Err(ReactorError::Mismatched(ready.token)),
        };

        match outcome {
            Ok((Flow::Continue, interest)) => self.rearm(ready.token, interest),
            Ok((Flow::Close(reason), _)) => self.close(ready.token, reason.into()),
            Err(err) => {
                log_failure(ready.token, &err);
                self.close(ready.token, Outcome::Failed(err.to_string()))
            }
        }
    }

    /// Re-arms the listener unless accepting ran out of resources. A starved
    /// listener waits for the next close or the retry timeout.
    fn after_accept(&mut self, listener: Token, state: AcceptState) -> Result<(), ReactorError> {
        if state.keep_armed() {
            self.mux.reregister(listener, Interest::READABLE)
        } else {
            if !self.starved.contains(&listener) {
                self.starved.push(listener);
            }
            Ok(())
        }
    }

    fn resume_listeners(&mut self) -> Result<(), ReactorError> {
        for listener in std::mem::take(&mut self.starved) {
            if self.mux.contains(listener) {
                debug!(token = listener.0, "Resuming listener");
                self.mux.reregister(listener, Interest::READABLE)?;
            }
        }
        Ok(())
    }

    /// Re-arms a connection. An I/O failure only ends that connection.
    fn rearm(&mut self, token: Token, interest: Interest) -> Result<(), ReactorError> {
        match self.mux.reregister(token, interest) {
            Err(ReactorError::Io(err)) => {
                warn!(token = token.0, error = %err, "Failed to re-arm connection");
                self.close(token, Outcome::Failed(err.to_string()))
            }
            other => other,
        }
    }

    /// Unregisters `token` and drops its socket.
    ///
    /// A closed connection releases a descriptor, so starved listeners are
    /// re-armed.
    fn close(&mut self, token: Token, outcome: Outcome) -> Result<(), ReactorError> {
        let registration = self.mux.unregister(token)?;
        if !registration.state.is_acceptor() {
            self.stats.connection_closed();
        }
        self.record(registration, outcome);
        self.resume_listeners()
    }

    fn record(&mut self, registration: Registration, outcome: Outcome) {
        match registration.state {
            ConnectionState::Acceptor => debug!("Closing listener"),
            ConnectionState::Server(conn) => {
                info!(peer = %conn.peer(), "Closing connection");
            }
            ConnectionState::Client(conn) => {
                info!(id = conn.id(), ?outcome, "Closing connection");
                self.reports.push(ConnectionReport {
                    id: conn.id(),
                    messages_sent: conn.messages_sent(),
                    bytes_received: conn.received(),
                    outcome,
                });
            }
        }
    }

    fn teardown(&mut self) {
        let remaining = self.mux.close_all();
        if !remaining.is_empty() {
            info!(count = remaining.len(), "Closing remaining registrations");
        }

        for registration in remaining {
            if !registration.state.is_acceptor() {
                self.stats.connection_closed();
            }
            self.record(registration, Outcome::Unfinished);
        }
    }

    /// Reports of client connections closed so far, oldest first.
    pub fn take_reports(&mut self) -> Vec<ConnectionReport> {
        std::mem::take(&mut self.reports)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.mux.shutdown_handle()
    }

    /// Number of live registrations, the listener included
    pub fn registrations(&self) -> usize {
        self.mux.len()
    }
}

fn log_failure(token: Token, err: &ConnectionError) {
    if err.is_protocol_error() {
        error!(token = token.0, error = %err, "Protocol error");
    } else {
        warn!(token = token.0, error = %err, "Connection error");
    }
}
