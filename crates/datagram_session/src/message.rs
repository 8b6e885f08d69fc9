use bytes::Bytes;
use std::convert::Infallible;
use std::time::Duration;

use crate::context::Context;

/// An outbound message that knows how to serialize itself.
///
/// The message carries its own [`Context`], which bounds the write in
/// [`Session::write_message`](crate::Session::write_message) instead of the
/// session's context. That lets a caller put a deadline on a single write.
pub trait Message: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn marshal(&self) -> Result<Bytes, Self::Error>;

    fn context(&self) -> &Context;
}

/// A prost message paired with the context that bounds its write.
#[derive(Debug, Clone)]
pub struct Envelope<M> {
    message: M,
    context: Context,
}

impl<M> Envelope<M> {
    pub fn new(message: M, context: Context) -> Self {
        Self { message, context }
    }

    /// Wrap `message` with a write deadline of `timeout` derived from `parent`.
    pub fn with_timeout(message: M, parent: &Context, timeout: Duration) -> Self {
        let (context, _cancel) = parent.with_timeout(timeout);
        Self { message, context }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn into_inner(self) -> M {
        self.message
    }
}

impl<M: prost::Message> Message for Envelope<M> {
    type Error = prost::EncodeError;

    fn marshal(&self) -> Result<Bytes, prost::EncodeError> {
        let mut buf = Vec::with_capacity(self.message.encoded_len());
        self.message.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

/// Pre-encoded bytes.
#[derive(Debug, Clone)]
pub struct RawMessage {
    data: Bytes,
    context: Context,
}

impl RawMessage {
    pub fn new(data: impl Into<Bytes>, context: Context) -> Self {
        Self {
            data: data.into(),
            context,
        }
    }
}

impl Message for RawMessage {
    type Error = Infallible;

    fn marshal(&self) -> Result<Bytes, Infallible> {
        Ok(self.data.clone())
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Reading {
        #[prost(string, tag = "1")]
        sensor_id: String,
        #[prost(double, tag = "2")]
        celsius: f64,
    }

    #[test]
    fn test_envelope_marshals_prost_message() {
        let reading = Reading {
            sensor_id: "sensor-3".to_string(),
            celsius: 21.5,
        };
        let envelope = Envelope::new(reading.clone(), Context::background());

        let bytes = envelope.marshal().unwrap();
        let decoded = <Reading as prost::Message>::decode(bytes).unwrap();
        assert_eq!(decoded, reading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_envelope_timeout_sets_write_deadline() {
        let envelope = Envelope::with_timeout(
            Reading::default(),
            &Context::background(),
            Duration::from_millis(250),
        );

        assert!(envelope.context().deadline().is_some());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(envelope.context().is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_envelope_accepts_unbounded_timeout() {
        let reading = Reading {
            sensor_id: "sensor-9".to_string(),
            celsius: -4.0,
        };
        let envelope = Envelope::with_timeout(reading, &Context::background(), Duration::MAX);

        assert!(!envelope.context().is_done());
        assert_eq!(envelope.message().sensor_id, "sensor-9");
        assert_eq!(envelope.into_inner().celsius, -4.0);
    }

    #[test]
    fn test_raw_message_is_passed_through() {
        let raw = RawMessage::new(&b"\x40\x01\x00\x01"[..], Context::background());
        assert_eq!(raw.marshal().unwrap(), Bytes::from_static(b"\x40\x01\x00\x01"));
    }
}
