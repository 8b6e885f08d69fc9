use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::context::Context;
use crate::error::TransportError;

/// A duplex datagram endpoint driven by a [`Session`](crate::Session).
///
/// Reads and writes are bounded by the supplied [`Context`]: an
/// implementation must give up with [`TransportError::Context`] once the
/// context is cancelled or its deadline passes. The session never issues two
/// reads at once, but a write may run concurrently with a read.
pub trait Connection: Send + Sync {
    /// Receive one datagram into `buf`, returning its length.
    fn read_with_context(
        &self,
        ctx: &Context,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, TransportError>> + Send;

    /// Send `data` as one datagram.
    fn write_with_context(
        &self,
        ctx: &Context,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn remote_addr(&self) -> SocketAddr;

    /// Release the connection. Pending and later I/O fails.
    fn close(&self) -> Result<(), TransportError>;
}

/// A shared connection. A session built over an `Arc` leaves the caller a
/// handle, so with `close_socket = false` the transport outlives the session.
impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn read_with_context(
        &self,
        ctx: &Context,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, TransportError>> + Send {
        (**self).read_with_context(ctx, buf)
    }

    fn write_with_context(
        &self,
        ctx: &Context,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).write_with_context(ctx, data)
    }

    fn remote_addr(&self) -> SocketAddr {
        (**self).remote_addr()
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }
}
