use duet::config::ServerConfig;
use duet::signaling::SignalingServer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env()?;

    println!("   Duet Signaling Server");
    println!("   Binding to {}", config.listen_addr);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::bind(&config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
