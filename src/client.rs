//! The multiplexed client role.
//!
//! Opens every connection up front and drives all of them from one reactor
//! loop. The loop ends when every connection has closed, or when the
//! configured idle timeout passes without any readiness.

use crate::config::{resolve, ClientConfig};
use crate::connection::{ClientConnection, ConnectionStats};
use crate::reactor::{ConnectionReport, Exit, Outcome, Reactor, ReactorError, ShutdownHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Result of a client run.
#[derive(Debug, Clone)]
pub struct ClientReport {
    /// Why the loop stopped
    pub exit: Exit,
    /// One entry per connection, ordered by id
    pub connections: Vec<ConnectionReport>,
}

impl ClientReport {
    pub fn completed(&self) -> usize {
        self.count(|o| *o == Outcome::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// True when every connection received its full reply.
    pub fn is_success(&self) -> bool {
        self.completed() == self.connections.len()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.connections.iter().filter(|c| pred(&c.outcome)).count()
    }
}

/// A set of outbound connections sharing one reactor.
#[derive(Debug)]
pub struct Client {
    reactor: Reactor,
    timeout: Option<Duration>,
}

impl Client {
    /// Resolves the server address and starts every connection.
    pub fn connect(config: &ClientConfig) -> Result<Self, ReactorError> {
        let addr = resolve(&config.server_address())?;
        let mut reactor = Reactor::new(config.events_capacity)?;

        for id in 1..=config.connections {
            let connection = ClientConnection::new(id, &config.messages, config.accounting);
            reactor.connect(addr, connection)?;
        }

        Ok(Self {
            reactor,
            timeout: config.idle_timeout(),
        })
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.reactor.stats()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.reactor.shutdown_handle()
    }

    /// Live registrations; zero after a run.
    pub fn registrations(&self) -> usize {
        self.reactor.registrations()
    }

    /// Runs until every connection is closed.
    pub fn run(&mut self) -> Result<ClientReport, ReactorError> {
        let exit = self.reactor.run(self.timeout)?;

        let mut connections = self.reactor.take_reports();
        connections.sort_by_key(|c| c.id);

        let report = ClientReport { exit, connections };
        info!(
            ?exit,
            completed = report.completed(),
            failed = report.failed(),
            total = report.connections.len(),
            "Client finished"
        );
        Ok(report)
    }
}
