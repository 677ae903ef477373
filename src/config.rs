//! Command-line configuration for the server and client binaries.

use crate::connection::Accounting;
use crate::reactor::{ReactorError, DEFAULT_EVENTS_CAPACITY};
use crate::{DEFAULT_CONNECTIONS, DEFAULT_HOST, DEFAULT_PORT, MESSAGES};
use bytes::Bytes;
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "muxecho", version, about = "Single-threaded readiness-driven echo server")]
pub struct ServerConfig {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of readiness events handled per poll
    #[arg(long = "events", default_value_t = DEFAULT_EVENTS_CAPACITY)]
    pub events_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client configuration
#[derive(Debug, Clone, Parser)]
#[command(
    name = "muxecho-client",
    version,
    about = "Opens many concurrent connections to a muxecho server over one poll loop"
)]
pub struct ClientConfig {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of simultaneous connections
    #[arg(short = 'n', long, default_value_t = DEFAULT_CONNECTIONS)]
    pub connections: usize,

    /// How a connection decides it has received everything
    #[arg(long, value_enum, default_value_t = Accounting::Echo)]
    pub accounting: Accounting,

    /// Stop after this many seconds without any readiness event
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Maximum number of readiness events handled per poll
    #[arg(long = "events", default_value_t = DEFAULT_EVENTS_CAPACITY)]
    pub events_capacity: usize,

    /// Payloads sent by every connection
    #[arg(skip = default_messages())]
    pub messages: Vec<Bytes>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connections: DEFAULT_CONNECTIONS,
            accounting: Accounting::default(),
            timeout: None,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            messages: default_messages(),
        }
    }
}

impl ClientConfig {
    /// Returns the server address as a string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle timeout handed to the reactor loop
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

fn default_messages() -> Vec<Bytes> {
    MESSAGES.iter().map(|m| Bytes::from_static(m)).collect()
}

/// Resolves `address` to the first socket address it names.
pub fn resolve(address: &str) -> Result<SocketAddr, ReactorError> {
    address
        .to_socket_addrs()
        .map_err(|_| ReactorError::Resolve(address.to_string()))?
        .next()
        .ok_or_else(|| ReactorError::Resolve(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::try_parse_from(["muxecho"]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8888");
        assert_eq!(config.events_capacity, DEFAULT_EVENTS_CAPACITY);
    }

    #[test]
    fn test_server_port_flag() {
        let config =
            ServerConfig::try_parse_from(["muxecho", "--host", "0.0.0.0", "-p", "9000"]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::try_parse_from(["muxecho-client"]).unwrap();
        assert_eq!(config.connections, 50);
        assert_eq!(config.accounting, Accounting::Echo);
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(
            config.messages,
            vec![
                Bytes::from_static(b"Message 1 from client."),
                Bytes::from_static(b"Message 2 from client."),
            ]
        );
    }

    #[test]
    fn test_client_flags() {
        let config = ClientConfig::try_parse_from([
            "muxecho-client",
            "--port",
            "7000",
            "-n",
            "3",
            "--accounting",
            "raw",
            "--timeout",
            "2",
        ])
        .unwrap();
        assert_eq!(config.server_address(), "127.0.0.1:7000");
        assert_eq!(config.connections, 3);
        assert_eq!(config.accounting, Accounting::Raw);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(ServerConfig::try_parse_from(["muxecho", "-p", "not-a-port"]).is_err());
    }

    #[test]
    fn test_resolve() {
        let addr = resolve("127.0.0.1:8888").unwrap();
        assert_eq!(addr.port(), 8888);

        assert!(matches!(
            resolve("not an address"),
            Err(ReactorError::Resolve(_))
        ));
    }
}
