use bytes::Bytes;
use dashmap::DashMap;
use datagram_session::{CancelHandle, Connection, Context, TransportError};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::ServerError;

/// Where a datagram from a peer ended up.
#[derive(Debug)]
pub enum Dispatch {
    /// Queued for the peer's session.
    Delivered,

    /// The peer's queue is full; the datagram was dropped.
    QueueFull,

    /// The peer's session is shutting down; the datagram was dropped.
    Closed,

    /// No session exists for this peer. The datagram is handed back.
    Unknown(Bytes),
}

/// Tracks the active session of each peer.
///
/// Only one session is allowed per remote address at a time. Registering a
/// peer returns a guard that removes the peer when dropped.
#[derive(Debug)]
pub struct PeerMap {
    peers: DashMap<SocketAddr, mpsc::Sender<Bytes>, ahash::RandomState>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self {
            peers: DashMap::default(),
        }
    }

    /// Register `addr`, routing its datagrams into `inbound`.
    ///
    /// Returns an error if a session already exists for this address.
    pub fn try_register(
        self: &Arc<Self>,
        addr: SocketAddr,
        inbound: mpsc::Sender<Bytes>,
    ) -> Result<PeerGuard, ServerError> {
        use dashmap::mapref::entry::Entry;

        match self.peers.entry(addr) {
            Entry::Occupied(_) => Err(ServerError::PeerAlreadyActive(addr)),
            Entry::Vacant(slot) => {
                slot.insert(inbound);
                Ok(PeerGuard {
                    addr,
                    map: Arc::clone(self),
                })
            }
        }
    }

    /// Hand a datagram to the session registered for `addr`.
    pub fn dispatch(&self, addr: SocketAddr, datagram: Bytes) -> Dispatch {
        let Some(inbound) = self.peers.get(&addr) else {
            return Dispatch::Unknown(datagram);
        };
        match inbound.try_send(datagram) {
            Ok(()) => Dispatch::Delivered,
            Err(TrySendError::Full(_)) => Dispatch::QueueFull,
            Err(TrySendError::Closed(_)) => Dispatch::Closed,
        }
    }

    /// Check if a session exists for the given address.
    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    /// Get the number of active peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn remove(&self, addr: &SocketAddr) {
        self.peers.remove(addr);
    }
}

impl Default for PeerMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a peer registered. When dropped, the peer is removed.
pub struct PeerGuard {
    addr: SocketAddr,
    map: Arc<PeerMap>,
}

impl PeerGuard {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for PeerGuard {
    fn drop(&mut self) {
        self.map.remove(&self.addr);
    }
}

impl fmt::Debug for PeerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerGuard").field("addr", &self.addr).finish()
    }
}

/// One peer's view of a shared, unconnected socket.
///
/// The server's receive loop feeds this peer's datagrams through a channel;
/// replies go straight out of the shared socket with `send_to`. Closing the
/// connection never closes the shared socket.
#[derive(Debug)]
pub struct PeerConnection {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    lifetime: Context,
    closer: CancelHandle,
}

impl PeerConnection {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr, inbound: mpsc::Receiver<Bytes>) -> Self {
        let (lifetime, closer) = Context::background().with_cancel();
        Self {
            socket,
            remote,
            inbound: tokio::sync::Mutex::new(inbound),
            lifetime,
            closer,
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.lifetime.is_done() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Connection for PeerConnection {
    async fn read_with_context(
        &self,
        ctx: &Context,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        self.ensure_open()?;
        let mut inbound = self.inbound.lock().await;
        let received = tokio::select! {
            biased;
            _ = self.lifetime.done() => None,
            received = ctx.run(inbound.recv()) => Some(received),
        };
        let Some(received) = received else {
            // Closed while this read held the queue.
            inbound.close();
            return Err(TransportError::Closed);
        };
        let datagram = received?.ok_or(TransportError::Closed)?;

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }

    async fn write_with_context(&self, ctx: &Context, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        ctx.run(self.socket.send_to(data, self.remote)).await??;
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Stop accepting datagrams. Later dispatches report [`Dispatch::Closed`].
    fn close(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.closer.cancel();
        if let Ok(mut inbound) = self.inbound.try_lock() {
            inbound.close();
        }
        Ok(())
    }
}
