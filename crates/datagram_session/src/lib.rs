//! Per-connection session supervision for datagram transports.
//!
//! A [`Session`] owns one [`Connection`]: it runs the read loop that feeds a
//! [`Processor`], closes itself after an idle window, and runs its close hooks
//! exactly once however it ends.
//!
//! ```ignore
//! let connection = UdpConnection::connect("0.0.0.0:0", peer).await?;
//! let session = Arc::new(Session::new(&Context::background(), connection, 1152, true));
//! session.add_on_close(|| tracing::info!("peer gone"));
//! session.run(processor_fn(|datagram| handle(datagram))).await?;
//! ```

mod cell;
mod config;
mod context;
mod error;
mod hooks;
mod idle;
mod message;
mod processor;
mod session;
mod state;
mod transport;
mod udp;

#[cfg(test)]
mod testing;

pub use cell::{ContextCell, ContextSnapshot};
pub use config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, SessionConfig};
pub use context::{CancelHandle, Context};
pub use error::{ContextError, SessionError, TransportError};
pub use hooks::{CloseHook, CloseHooks, DrainSummary};
pub use idle::IdleTimer;
pub use message::{Envelope, Message, RawMessage};
pub use processor::{FnProcessor, Processor, processor_fn};
pub use session::{Done, Session};
pub use state::SessionState;
pub use transport::Connection;
pub use udp::UdpConnection;
