use std::time::Duration;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The reason a [`Context`](crate::Context) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors reported by a [`Connection`](crate::Connection).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The context bounding the operation was cancelled or expired.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// An error from the underlying socket.
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true if the operation stopped because its context ended.
    pub fn is_context(&self) -> bool {
        matches!(self, TransportError::Context(_))
    }
}

/// Errors surfaced by a [`Session`](crate::Session).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The outbound message could not be serialized. The session is unaffected.
    #[error("cannot marshal message")]
    Encoding(#[source] BoxError),

    /// Reading from the transport failed; the run loop stopped.
    #[error("failed to read from transport")]
    TransportRead(#[source] TransportError),

    /// Writing to the transport failed. The session is unaffected.
    #[error("failed to write to transport")]
    TransportWrite(#[source] TransportError),

    /// Closing the transport during teardown failed.
    #[error("failed to close transport")]
    TransportClose(#[source] TransportError),

    /// The message processor rejected a datagram; the run loop stopped.
    #[error("message processor failed")]
    Processing(#[source] BoxError),

    /// No datagram arrived within the idle window.
    #[error("session idle for {0:?}")]
    IdleTimeout(Duration),

    /// One or more close hooks panicked while draining.
    #[error("{0} close hook(s) panicked")]
    HookPanicked(usize),

    /// `run` was called on a session that has already been started.
    #[error("session is already running")]
    AlreadyRunning,
}
