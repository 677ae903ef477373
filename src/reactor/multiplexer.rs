//! Readiness multiplexer over `mio::Poll`.
//!
//! Each registration owns its socket and its connection state and is keyed
//! by a [`Token`]. [`Multiplexer::poll`] blocks until something is ready and
//! returns plain [`Readiness`] values, so handlers can unregister any token,
//! including the one being dispatched, without invalidating the batch: events
//! for tokens that are gone are simply not found.

use super::ReactorError;
use crate::connection::ConnectionState;
use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Token reserved for the shutdown waker
const WAKE_TOKEN: Token = Token(usize::MAX);

/// Default number of events fetched per poll
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// A socket owned by the multiplexer.
#[derive(Debug)]
pub enum Socket {
    Listener(TcpListener),
    Stream(TcpStream),
}

impl Source for Socket {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Socket::Listener(listener) => listener.register(registry, token, interests),
            Socket::Stream(stream) => stream.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Socket::Listener(listener) => listener.reregister(registry, token, interests),
            Socket::Stream(stream) => stream.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Socket::Listener(listener) => listener.deregister(registry),
            Socket::Stream(stream) => stream.deregister(registry),
        }
    }
}

/// A watched socket with its interest and state.
#[derive(Debug)]
pub struct Registration {
    pub socket: Socket,
    pub interest: Interest,
    pub state: ConnectionState,
}

/// The directions a registration is ready for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn new(token: Token, readable: bool, writable: bool) -> Self {
        Self {
            token,
            readable,
            writable,
        }
    }
}

/// Asks a running reactor to stop. Safe to use from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Requests shutdown and wakes the poll if it is blocked.
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake the reactor");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// The set of registrations and the poll that watches them.
#[derive(Debug)]
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    registrations: HashMap<Token, Registration>,
    next_token: usize,
    shutdown: ShutdownHandle,
}

impl Multiplexer {
    /// Creates a multiplexer fetching at most `capacity` events per poll.
    pub fn new(capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(capacity.max(1)),
            registrations: HashMap::new(),
            next_token: 0,
            shutdown: ShutdownHandle {
                waker,
                requested: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    /// Adds a watch and returns its token.
    ///
    /// The socket moves into the multiplexer and every call takes a token
    /// that was never handed out before, so the same socket cannot be
    /// registered twice.
    pub fn register(
        &mut self,
        mut socket: Socket,
        interest: Interest,
        state: ConnectionState,
    ) -> Result<Token, ReactorError> {
        let token = Token(self.next_token);
        self.next_token += 1;

        self.poll
            .registry()
            .register(&mut socket, token, interest)?;

        self.registrations.insert(
            token,
            Registration {
                socket,
                interest,
                state,
            },
        );
        debug!(token = token.0, ?interest, "Registered");
        Ok(token)
    }

    /// Re-arms a watch, possibly with a new interest.
    ///
    /// The poll is edge-triggered; re-arming makes it report readiness that
    /// is still present on the next call.
    pub fn reregister(&mut self, token: Token, interest: Interest) -> Result<(), ReactorError> {
        let registry = self.poll.registry();
        let registration = self
            .registrations
            .get_mut(&token)
            .ok_or(ReactorError::NotRegistered(token))?;

        registry.reregister(&mut registration.socket, token, interest)?;
        registration.interest = interest;
        Ok(())
    }

    /// Removes a watch and hands back its socket and state.
    ///
    /// Dropping the returned registration closes the socket, which also
    /// removes it from the poll, so a failed deregister is only logged.
    pub fn unregister(&mut self, token: Token) -> Result<Registration, ReactorError> {
        let mut registration = self
            .registrations
            .remove(&token)
            .ok_or(ReactorError::NotRegistered(token))?;

        if let Err(e) = self.poll.registry().deregister(&mut registration.socket) {
            warn!(token = token.0, error = %e, "Deregister failed");
        }
        debug!(token = token.0, "Unregistered");
        Ok(registration)
    }

    /// Removes the socket from the poll but keeps the registration, so that
    /// the next re-arm fails.
    #[cfg(test)]
    pub(crate) fn detach_from_poll(&mut self, token: Token) -> io::Result<()> {
        let registry = self.poll.registry();
        match self.registrations.get_mut(&token) {
            Some(registration) => registry.deregister(&mut registration.socket),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    /// Blocks until at least one registration is ready, `timeout` elapses or
    /// shutdown is requested. `None` waits forever.
    ///
    /// Only directions that intersect a registration's interest are
    /// reported. Errors and hang-ups count as ready so that the next read or
    /// write surfaces them.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Readiness>, ReactorError> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let mut ready = Vec::with_capacity(self.events.iter().count());
        for event in self.events.iter() {
            let token = event.token();
            if token == WAKE_TOKEN {
                continue;
            }

            let Some(registration) = self.registrations.get(&token) else {
                continue;
            };

            let failed = event.is_error();
            let readable = registration.interest.is_readable()
                && (event.is_readable() || event.is_read_closed() || failed);
            let writable = registration.interest.is_writable()
                && (event.is_writable() || event.is_write_closed() || failed);

            if readable || writable {
                ready.push(Readiness::new(token, readable, writable));
            }
        }

        Ok(ready)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Registration> {
        self.registrations.get_mut(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.registrations.contains_key(&token)
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Removes every registration and hands them back.
    pub fn close_all(&mut self) -> Vec<Registration> {
        let registry = self.poll.registry();
        self.registrations
            .drain()
            .map(|(token, mut registration)| {
                if let Err(e) = registry.deregister(&mut registration.socket) {
                    debug!(token = token.0, error = %e, "Deregister failed during teardown");
                }
                registration
            })
            .collect()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }
}
