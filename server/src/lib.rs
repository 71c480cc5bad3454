//! LAN lobby server for a legacy RTS.
//!
//! Stands in for the game's retail matchmaker on a local network: clients
//! connect over plain TCP, log in, see each other, form rooms, start games
//! and stream simulation data through the lobby's fan-out router. The
//! protocol is the client's own framed binary format
//! (see `lan-lobby-protocol`); nothing on the client side changes.

pub mod error;
pub mod lobby;
pub mod player;
pub mod room;
pub mod session;

pub use error::ServerError;
pub use lobby::{Lobby, LobbyHandle};

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Configuration for the server.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the TCP listener.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", lan_lobby_protocol::DEFAULT_PORT),
        }
    }
}

/// A bound lobby server. [`Server::run`] accepts clients until the process
/// ends; there is no orderly shutdown, matching the appliance-style use.
pub struct Server {
    listener: TcpListener,
    lobby: LobbyHandle,
}

impl Server {
    /// Binds the listener and spawns the lobby task.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        tracing::info!("Lobby listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            lobby: Lobby::spawn(),
        })
    }

    /// The actual bound address; useful when the port was 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop: one session per connection, all wired to the one lobby.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::info!("Client connected:    {peer}");
                    tokio::spawn(session::run(stream, peer.to_string(), self.lobby.clone()));
                }
                Err(e) => {
                    tracing::error!("could not accept connection: {e}");
                }
            }
        }
    }
}
