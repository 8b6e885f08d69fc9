use bytes::Bytes;
use datagram_session::{Context, Session, SessionError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::echo::EchoProcessor;
use crate::error::ServerError;
use crate::peer::{Dispatch, PeerConnection, PeerMap};

/// Context key holding the peer's address on every session the server starts.
pub const PEER_ADDR_KEY: &str = "peer_addr";

/// A UDP echo server with one [`Session`] per peer.
///
/// The server owns the listening socket and demultiplexes datagrams by source
/// address. The first datagram from an unknown peer starts a session for it;
/// the session releases the peer when it closes, so the next datagram from
/// that address starts a fresh one.
pub struct EchoServer {
    socket: Arc<UdpSocket>,
    peers: Arc<PeerMap>,
    config: ServerConfig,
}

impl EchoServer {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        Ok(Self {
            socket: Arc::new(socket),
            peers: Arc::new(PeerMap::new()),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The active peers. Stays valid after [`EchoServer::run`] consumes the server.
    pub fn peers(&self) -> Arc<PeerMap> {
        Arc::clone(&self.peers)
    }

    /// Serve until `ctx` is cancelled, then wait for every session to close.
    ///
    /// Sessions derive from `ctx`, so cancelling it also closes them.
    pub async fn run(self, ctx: Context) -> Result<(), ServerError> {
        let mut buf = vec![0u8; self.config.max_message_size];
        let mut sessions = JoinSet::new();

        info!(addr = ?self.local_addr().ok(), "Echo server started");

        loop {
            let (len, from) = tokio::select! {
                biased;
                _ = ctx.done() => break,
                received = self.socket.recv_from(&mut buf) => {
                    received.map_err(ServerError::Receive)?
                }
            };
            let datagram = Bytes::copy_from_slice(&buf[..len]);

            match self.peers.dispatch(from, datagram) {
                Dispatch::Delivered => {}
                Dispatch::QueueFull => {
                    warn!(remote_addr = %from, "Peer queue full, dropping datagram");
                }
                Dispatch::Closed => {
                    debug!(remote_addr = %from, "Peer session closing, dropping datagram");
                }
                Dispatch::Unknown(datagram) => {
                    if let Err(e) = self.accept(&ctx, from, datagram, &mut sessions) {
                        warn!(remote_addr = %from, error = %e, "Failed to start session");
                    }
                }
            }

            while sessions.try_join_next().is_some() {}
        }

        info!(
            sessions = sessions.len(),
            "Echo server shutting down, waiting for sessions"
        );
        while sessions.join_next().await.is_some() {}

        Ok(())
    }

    fn accept(
        &self,
        ctx: &Context,
        remote: SocketAddr,
        first: Bytes,
        sessions: &mut JoinSet<()>,
    ) -> Result<(), ServerError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.peer_queue_depth.max(1));
        let guard = self.peers.try_register(remote, inbound_tx.clone())?;
        // The queue is new and has room, so this cannot fail.
        let _ = inbound_tx.try_send(first);

        let connection = PeerConnection::new(Arc::clone(&self.socket), remote, inbound_rx);
        let session = Arc::new(Session::with_config(
            ctx,
            connection,
            self.config.session_config(),
        ));
        session.set_context_value(PEER_ADDR_KEY, remote);
        session.add_on_close(move || {
            debug!(remote_addr = %guard.addr(), "Releasing peer");
            drop(guard);
        });

        info!(
            session_id = %session.id(),
            remote_addr = %remote,
            active_peers = self.peers.len(),
            "Accepted new peer"
        );

        let processor = EchoProcessor::new(Arc::clone(&session), self.config.write_timeout);
        sessions.spawn(async move {
            match session.run(processor).await {
                Ok(()) => {
                    debug!(session_id = %session.id(), remote_addr = %remote, "Session closed");
                }
                Err(SessionError::IdleTimeout(timeout)) => {
                    info!(
                        session_id = %session.id(),
                        remote_addr = %remote,
                        ?timeout,
                        "Peer idle, session closed"
                    );
                }
                Err(e) => {
                    warn!(
                        session_id = %session.id(),
                        remote_addr = %remote,
                        error = %e,
                        "Session ended with error"
                    );
                }
            }
        });

        Ok(())
    }
}
