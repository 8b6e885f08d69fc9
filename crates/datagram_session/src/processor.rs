use std::future::{self, Future};

/// Interprets the datagrams a [`Session`](crate::Session) reads.
///
/// `process` is called once per datagram, in read order, and never
/// concurrently. Returning an error stops the session's run loop.
pub trait Processor: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    fn process(&mut self, datagram: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A [`Processor`] backed by a synchronous closure. See [`processor_fn`].
#[derive(Debug, Clone)]
pub struct FnProcessor<F> {
    f: F,
}

/// Build a [`Processor`] from a closure.
pub fn processor_fn<F, E>(f: F) -> FnProcessor<F>
where
    F: FnMut(&[u8]) -> Result<(), E> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    FnProcessor { f }
}

impl<F, E> Processor for FnProcessor<F>
where
    F: FnMut(&[u8]) -> Result<(), E> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn process(&mut self, datagram: &[u8]) -> impl Future<Output = Result<(), E>> + Send {
        future::ready((self.f)(datagram))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_processor_sees_each_datagram() {
        let mut seen = Vec::new();
        {
            let mut processor = processor_fn(|datagram: &[u8]| {
                seen.push(datagram.to_vec());
                Ok::<_, std::io::Error>(())
            });
            processor.process(b"one").await.unwrap();
            processor.process(b"two").await.unwrap();
        }
        assert_eq!(seen, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_closure_processor_propagates_error() {
        let mut processor =
            processor_fn(|_: &[u8]| Err(std::io::Error::other("unsupported option")));
        let err = processor.process(b"\x00").await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported option");
    }
}
