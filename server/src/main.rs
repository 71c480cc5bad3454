//! LAN lobby server binary.
//!
//! Run it on any machine of the LAN and point the game clients at it. No
//! arguments; set `LOBBY_PORT` to listen somewhere other than the default.

use lan_lobby_server::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Ok(port) = std::env::var("LOBBY_PORT") {
        config.bind_addr = format!("0.0.0.0:{}", port.parse::<u16>()?);
    }

    println!("LAN lobby server");
    println!("  listening on {}", config.bind_addr);
    println!();

    let server = Server::bind(config).await?;
    server.run().await?;
    Ok(())
}
