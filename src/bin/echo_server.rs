use anyhow::Result;
use datagram_session::Context;
use udp_session_prototype::{EchoServer, ServerConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::from_env()?;
    println!("Echo server listening on {}", config.bind_addr);
    println!(
        "  max message size: {} bytes, idle timeout: {:?}",
        config.max_message_size, config.idle_timeout
    );

    let server = EchoServer::bind(config).await?;

    let (ctx, shutdown) = Context::background().with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Shutting down...");
            shutdown.cancel();
        }
    });

    server.run(ctx).await?;
    println!("Server stopped");
    Ok(())
}
