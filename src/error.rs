use datagram_session::SessionError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur while running the echo server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Receiving from the listening socket failed.
    #[error("failed to receive datagram")]
    Receive(#[source] std::io::Error),

    /// A session is already active for this peer.
    #[error("session already active for peer '{0}'")]
    PeerAlreadyActive(SocketAddr),
}

/// Errors that can occur in the echo client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Failed to open the client socket.
    #[error("failed to connect to {addr}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Timeout waiting for the echo reply.
    #[error("timeout waiting for reply to #{0}")]
    Timeout(u64),

    /// The session ended before a reply arrived.
    #[error("session closed")]
    Closed,
}

/// Errors raised while processing an echo request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EchoError {
    /// Failed to decode a protobuf message.
    #[error("protobuf decode error")]
    Decode(#[from] prost::DecodeError),
}

/// Errors reading configuration from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}
