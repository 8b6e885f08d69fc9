use datagram_session::{
    Context, Envelope, Processor, Session, SessionConfig, SessionError, UdpConnection,
};
use prost::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, EchoError};
use crate::proto::Echo;

/// Sends [`Echo`] requests to a server and waits for the replies.
///
/// The client runs its own [`Session`] over a connected UDP socket; replies
/// are decoded by the session's processor and handed back over a channel.
pub struct EchoClient {
    session: Arc<Session<UdpConnection>>,
    replies: mpsc::Receiver<Echo>,
    runner: JoinHandle<Result<(), SessionError>>,
    config: ClientConfig,
}

impl EchoClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let local = match config.server_addr {
            SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
            SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
        };
        let connection = UdpConnection::connect(local, config.server_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: config.server_addr,
                source,
            })?;

        let session = Arc::new(Session::with_config(
            &Context::background(),
            connection,
            SessionConfig::default().with_max_message_size(config.max_message_size),
        ));

        let (reply_tx, replies) = mpsc::channel(64);
        let runner = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run(ReplyCollector { replies: reply_tx }).await })
        };

        Ok(Self {
            session,
            replies,
            runner,
            config,
        })
    }

    pub fn session(&self) -> &Arc<Session<UdpConnection>> {
        &self.session
    }

    /// Send one request and wait for the reply with the same sequence number.
    ///
    /// Stale replies to earlier requests are skipped.
    pub async fn ping(&mut self, sequence: u64, payload: Vec<u8>) -> Result<Echo, ClientError> {
        let request = Echo {
            sequence,
            payload,
            echoed: 0,
        };
        let envelope =
            Envelope::with_timeout(request, &Context::background(), self.config.reply_timeout);
        self.session.write_message(&envelope).await?;

        let reply_timeout = self.config.reply_timeout;
        let wait = async {
            while let Some(reply) = self.replies.recv().await {
                if reply.sequence == sequence {
                    return Ok(reply);
                }
                tracing::debug!(expected = sequence, got = reply.sequence, "Skipping stale reply");
            }
            Err(ClientError::Closed)
        };
        tokio::time::timeout(reply_timeout, wait)
            .await
            .map_err(|_| ClientError::Timeout(sequence))?
    }

    /// Close the session and wait for it to finish.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        self.session.close()?;
        match self.runner.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Client session task failed");
                Ok(())
            }
        }
    }
}

struct ReplyCollector {
    replies: mpsc::Sender<Echo>,
}

impl Processor for ReplyCollector {
    type Error = EchoError;

    async fn process(&mut self, datagram: &[u8]) -> Result<(), EchoError> {
        let reply = Echo::decode(datagram)?;
        if self.replies.try_send(reply).is_err() {
            tracing::warn!("Reply queue full, dropping reply");
        }
        Ok(())
    }
}
