use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::time::interval;
use udp_session_prototype::{ClientConfig, EchoClient, init_tracing};

/// Interval between pings.
const PING_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ClientConfig::from_env()?;
    let count: u64 = std::env::var("PING_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    println!("Pinging {} {count} times", config.server_addr);

    let mut client = EchoClient::connect(config).await?;
    let mut ticker = interval(PING_INTERVAL);

    for sequence in 1..=count {
        ticker.tick().await;
        let started = Instant::now();
        match client.ping(sequence, format!("ping {sequence}").into_bytes()).await {
            Ok(reply) => println!(
                "Reply #{}: {} bytes, echoed={} in {:?}",
                reply.sequence,
                reply.payload.len(),
                reply.echoed,
                started.elapsed()
            ),
            Err(e) => eprintln!("[!] Ping #{sequence} failed: {e}"),
        }
    }

    client.shutdown().await?;
    Ok(())
}
