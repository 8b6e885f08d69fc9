//! A scripted in-memory transport for unit tests.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

use crate::context::Context;
use crate::error::TransportError;
use crate::transport::Connection;

type Inbound = Result<Vec<u8>, TransportError>;

#[derive(Default)]
struct Shared {
    written: Mutex<Vec<Vec<u8>>>,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

pub(crate) struct MockConnection {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    shared: Arc<Shared>,
    remote: SocketAddr,
}

/// The test's end of a [`MockConnection`].
pub(crate) struct MockPeer {
    tx: mpsc::UnboundedSender<Inbound>,
    shared: Arc<Shared>,
}

pub(crate) fn mock_connection() -> (MockConnection, MockPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    let connection = MockConnection {
        inbound: tokio::sync::Mutex::new(rx),
        shared: Arc::clone(&shared),
        remote: SocketAddr::from(([192, 0, 2, 10], 5684)),
    };
    (connection, MockPeer { tx, shared })
}

impl MockPeer {
    /// Queue a datagram for the next read.
    pub(crate) fn send(&self, data: &[u8]) {
        let _ = self.tx.send(Ok(data.to_vec()));
    }

    /// Make the next read fail with `err`.
    pub(crate) fn fail(&self, err: TransportError) {
        let _ = self.tx.send(Err(err));
    }

    pub(crate) fn fail_close(&self) {
        self.shared.fail_close.store(true, Ordering::SeqCst);
    }

    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.shared.written.lock().clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    async fn read_with_context(
        &self,
        ctx: &Context,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let mut inbound = self.inbound.lock().await;
        match ctx.run(inbound.recv()).await? {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Err(err)) => Err(err),
            None => Err(TransportError::Closed),
        }
    }

    async fn write_with_context(&self, ctx: &Context, data: &[u8]) -> Result<(), TransportError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        self.shared.written.lock().push(data.to_vec());
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn close(&self) -> Result<(), TransportError> {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("close failed").into());
        }
        Ok(())
    }
}
