//! Wire messages exchanged by the echo server and client.

/// An echo request, and the reply that mirrors it.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Echo {
    /// Chosen by the client; copied into the reply.
    #[prost(uint64, tag = "1")]
    pub sequence: u64,

    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,

    /// Set by the server on replies: how many requests this peer's session has
    /// echoed, including this one.
    #[prost(uint64, tag = "3")]
    pub echoed: u64,
}
