use datagram_session::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, SessionConfig};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the echo server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub bind_addr: SocketAddr,

    /// Largest datagram accepted from a peer.
    pub max_message_size: usize,

    /// Close a peer's session after this long without a datagram.
    pub idle_timeout: Duration,

    /// Datagrams buffered per peer before new ones are dropped.
    pub peer_queue_depth: usize,

    /// Deadline for writing a single reply.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5684)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            peer_queue_depth: 64,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Read overrides from `BIND_ADDR`, `MAX_MESSAGE_SIZE`, `IDLE_TIMEOUT_SECS`
    /// and `PEER_QUEUE_DEPTH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr)?,
            max_message_size: env_or("MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            idle_timeout: Duration::from_secs(env_or(
                "IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )?),
            peer_queue_depth: env_or("PEER_QUEUE_DEPTH", defaults.peer_queue_depth)?,
            write_timeout: defaults.write_timeout,
        })
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Settings for each peer session. The server owns every peer connection,
    /// so sessions always close them.
    pub(crate) fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.max_message_size, true).with_idle_timeout(self.idle_timeout)
    }
}

/// Configuration for the echo client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub max_message_size: usize,

    /// How long to wait for each reply.
    pub reply_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 5684)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            reply_timeout: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Default::default()
        }
    }

    /// Read overrides from `SERVER_ADDR` and `MAX_MESSAGE_SIZE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            server_addr: env_or("SERVER_ADDR", defaults.server_addr)?,
            max_message_size: env_or("MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            reply_timeout: defaults.reply_timeout,
        })
    }

    /// Set the reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => parse_var(var, &value),
        Err(_) => Ok(default),
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5684);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));

        let session = config.session_config();
        assert!(session.close_socket);
        assert_eq!(session.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_parse_var() {
        let addr: SocketAddr = parse_var("BIND_ADDR", " 127.0.0.1:9000 ").unwrap();
        assert_eq!(addr.port(), 9000);

        let err = parse_var::<usize>("MAX_MESSAGE_SIZE", "lots").unwrap_err();
        assert_eq!(err.to_string(), "invalid value 'lots' for MAX_MESSAGE_SIZE");
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_idle_timeout(Duration::from_secs(1));
        assert_eq!(config.session_config().idle_timeout, Duration::from_secs(1));

        let client =
            ClientConfig::new(config.bind_addr).with_reply_timeout(Duration::from_millis(10));
        assert_eq!(client.reply_timeout, Duration::from_millis(10));
    }
}
