//! Test harness: an in-process server plus scripted TCP clients.

use std::time::Duration;

use lan_lobby_protocol::{cmd, LenPrefix, Packet, HEADER_SIZE};
use lan_lobby_server::{Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Starts a server on a random port and returns its address.
pub async fn start_server() -> String {
    let server = Server::bind(ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
    })
    .await
    .expect("server should bind");

    let addr = server.local_addr().expect("should have local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

/// One scripted game client.
pub struct TestClient {
    stream: TcpStream,
    /// Client id assigned by the server, learned from the welcome packet.
    pub id: u32,
}

impl TestClient {
    pub async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        Self { stream, id: 0 }
    }

    /// Sends a finished packet (`write_header` already called).
    pub async fn send(&mut self, p: &Packet) {
        assert!(p.send_size() > 0, "send() before write_header()");
        self.stream.write_all(p.wire()).await.expect("send packet");
    }

    /// Sends raw bytes, for deliberately broken frames.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("send raw bytes");
    }

    /// Receives the next packet, failing the test after a timeout.
    pub async fn recv(&mut self) -> Packet {
        timeout(RECV_TIMEOUT, self.recv_inner())
            .await
            .expect("timed out waiting for a packet")
            .expect("connection closed while waiting for a packet")
    }

    /// Receives packets until one carries `wanted`, discarding the rest.
    pub async fn recv_cmd(&mut self, wanted: u16) -> Packet {
        loop {
            let p = self.recv().await;
            if p.cmd() == wanted {
                return p;
            }
        }
    }

    /// `Some(packet)` or `None` on clean connection close.
    async fn recv_inner(&mut self) -> Option<Packet> {
        let mut header = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut header).await.ok()?;
        let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let mut frame = vec![0u8; HEADER_SIZE + size];
        frame[..HEADER_SIZE].copy_from_slice(&header);
        if size > 0 {
            self.stream.read_exact(&mut frame[HEADER_SIZE..]).await.ok()?;
        }
        Some(Packet::parse(frame).expect("server sent an unparseable frame"))
    }

    /// True once the server has dropped this connection.
    pub async fn is_disconnected(&mut self) -> bool {
        match timeout(RECV_TIMEOUT, self.recv_inner()).await {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(_) => false,
        }
    }

    /// Logs in and returns the welcome packet with its payload unread.
    /// Learns the assigned client id from the header.
    pub async fn login(&mut self, name: &str) -> Packet {
        let mut p = Packet::compose(cmd::LOGIN, 0, 0);
        p.write_string(b"1.0.0.7", LenPrefix::U8).unwrap();
        p.write_string(b"2.0.7", LenPrefix::U8).unwrap();
        p.write_string(b"", LenPrefix::U8).unwrap(); // email
        p.write_string(b"", LenPrefix::U8).unwrap(); // password
        p.write_string(name.as_bytes(), LenPrefix::U8).unwrap();
        p.write_header(cmd::LOGIN, 0, 0);
        self.send(&p).await;

        let welcome = self.recv_cmd(cmd::WELCOME).await;
        self.id = welcome.id1();
        welcome
    }

    pub async fn create_room(&mut self, name: &str, magic: u32) {
        let mut p = Packet::compose(cmd::CREATE_ROOM, self.id, 0);
        p.write_u32(8).unwrap();
        p.write_u8(0).unwrap();
        let desc = format!("\"{name}\"\t\"\"\t008C7");
        p.write_string(desc.as_bytes(), LenPrefix::U8).unwrap();
        p.write_string(b"0", LenPrefix::U8).unwrap();
        p.write_u32(magic).unwrap();
        p.write_u16(0).unwrap();
        p.write_header(cmd::CREATE_ROOM, self.id, 0);
        self.send(&p).await;
    }

    pub async fn join_room(&mut self, host_id: u32) {
        let mut p = Packet::compose(cmd::JOIN_ROOM, self.id, 0);
        p.write_u32(host_id).unwrap();
        p.write_header(cmd::JOIN_ROOM, self.id, 0);
        self.send(&p).await;
    }

    pub async fn start_game(&mut self) {
        self.send(&Packet::compose(cmd::START_GAME, self.id, 0)).await;
    }

    pub async fn leave_room(&mut self) {
        self.send(&Packet::compose(cmd::LEAVE_ROOM, self.id, 0)).await;
    }
}
