//! The echo server role.

use crate::config::{resolve, ServerConfig};
use crate::connection::ConnectionStats;
use crate::reactor::{Reactor, ReactorError, ShutdownHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// A bound echo server, ready to run.
#[derive(Debug)]
pub struct Server {
    reactor: Reactor,
    local_addr: SocketAddr,
}

impl Server {
    /// Resolves the configured address, binds and registers the listener.
    pub fn bind(config: &ServerConfig) -> Result<Self, ReactorError> {
        let addr = resolve(&config.bind_address())?;
        let mut reactor = Reactor::new(config.events_capacity)?;
        let local_addr = reactor.listen(addr)?;

        info!(address = %local_addr, "Listening");
        Ok(Self {
            reactor,
            local_addr,
        })
    }

    /// The address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.reactor.stats()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.reactor.shutdown_handle()
    }

    /// Serves until the shutdown handle fires.
    pub fn run(mut self) -> Result<(), ReactorError> {
        let exit = self.reactor.run(None)?;
        info!(?exit, "Server stopped");
        Ok(())
    }
}
