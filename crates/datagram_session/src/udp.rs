use std::io;
use std::net::SocketAddr;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::TransportError;
use crate::transport::Connection;

/// A [`Connection`] over a connected UDP socket.
///
/// `close` marks the connection closed and wakes any pending I/O; the socket
/// itself is released when the connection is dropped.
#[derive(Debug)]
pub struct UdpConnection {
    socket: UdpSocket,
    remote: SocketAddr,
    closed: CancellationToken,
}

impl UdpConnection {
    /// Bind to `local` and connect to `remote`.
    pub async fn connect(local: impl ToSocketAddrs, remote: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Self::from_connected(socket)
    }

    /// Wrap a socket that has already been connected to its peer.
    pub fn from_connected(socket: UdpSocket) -> io::Result<Self> {
        let remote = socket.peer_addr()?;
        Ok(Self {
            socket,
            remote,
            closed: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Connection for UdpConnection {
    async fn read_with_context(
        &self,
        ctx: &Context,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        self.ensure_open()?;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            received = ctx.run(self.socket.recv(buf)) => Ok(received??),
        }
    }

    async fn write_with_context(&self, ctx: &Context, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            sent = ctx.run(self.socket.send(data)) => {
                sent??;
                Ok(())
            }
        }
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn close(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.closed.cancel();
        Ok(())
    }
}
