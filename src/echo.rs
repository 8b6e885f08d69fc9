use datagram_session::{Connection, Context, Envelope, Processor, Session};
use prost::Message;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EchoError;
use crate::proto::Echo;

/// Decodes each [`Echo`] request and writes it back through the session.
///
/// A datagram that does not decode ends the peer's session. A reply that
/// cannot be written is logged and skipped; the session keeps running.
pub struct EchoProcessor<C: Connection> {
    session: Arc<Session<C>>,
    write_timeout: Duration,
    echoed: u64,
}

impl<C: Connection> EchoProcessor<C> {
    pub fn new(session: Arc<Session<C>>, write_timeout: Duration) -> Self {
        Self {
            session,
            write_timeout,
            echoed: 0,
        }
    }
}

impl<C: Connection> Processor for EchoProcessor<C> {
    type Error = EchoError;

    async fn process(&mut self, datagram: &[u8]) -> Result<(), EchoError> {
        let request = Echo::decode(datagram)?;
        self.echoed += 1;

        let reply = Echo {
            sequence: request.sequence,
            payload: request.payload,
            echoed: self.echoed,
        };
        // Replies get their own deadline; closing the session does not cut
        // short a reply already being written.
        let envelope = Envelope::with_timeout(reply, &Context::background(), self.write_timeout);

        if let Err(e) = self.session.write_message(&envelope).await {
            tracing::warn!(
                session_id = %self.session.id(),
                remote_addr = %self.session.remote_addr(),
                sequence = request.sequence,
                error = %e,
                "Failed to send echo reply"
            );
        }
        Ok(())
    }
}
