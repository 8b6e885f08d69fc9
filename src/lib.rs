pub mod client;
pub mod config;
pub mod echo;
pub mod error;
pub mod peer;
pub mod proto;
pub mod server;

use tracing_subscriber::EnvFilter;

pub use client::EchoClient;
pub use config::{ClientConfig, ServerConfig};
pub use server::{EchoServer, PEER_ADDR_KEY};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
