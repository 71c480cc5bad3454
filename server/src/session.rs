//! Per-connection I/O: a framing reader and a strictly ordered writer.
//!
//! Each TCP connection gets one reader task and one writer task. The reader
//! cuts the stream into complete frames (header plus announced body) and
//! posts them to the lobby mailbox. The writer drains a FIFO of shared
//! frame slices, finishing each write before starting the next, so a
//! client always sees packets in the order the lobby queued them.

use std::io::ErrorKind;
use std::sync::Arc;

use lan_lobby_protocol::{HEADER_SIZE, MAX_PACKET_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::lobby::LobbyHandle;

/// One outbound frame, allocated once and shared by every recipient queue.
/// The bytes live until the last queue has written them out.
pub type OutboundFrame = Arc<[u8]>;

/// The lobby's view of one connected client.
pub struct SessionHandle {
    id: u32,
    addr: String,
    queue: mpsc::UnboundedSender<OutboundFrame>,
}

impl SessionHandle {
    pub(crate) fn new(id: u32, addr: String, queue: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { id, addr, queue }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Appends a frame to the outbound queue. The writer task picks it up
    /// after everything queued before it.
    pub fn queue_buf(&self, frame: OutboundFrame) {
        // A closed queue means the writer already hit an error; the
        // disconnect notification is on its way.
        let _ = self.queue.send(frame);
    }
}

/// Runs one connection until it drops. Registers with the lobby, spawns the
/// writer, then reads frames on the current task.
pub async fn run(stream: TcpStream, addr: String, lobby: LobbyHandle) {
    let (read_half, write_half) = stream.into_split();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    let Some(id) = lobby.connect(addr.clone(), queue_tx).await else {
        return;
    };
    tracing::debug!("session {id} started for {addr}");

    tokio::spawn(write_frames(write_half, queue_rx, addr.clone(), lobby.clone(), id));
    read_frames(read_half, &addr, &lobby, id).await;
}

/// Reads header-then-body frames and forwards each to the lobby.
///
/// EOF is a normal disconnect; other read errors are logged. An announced
/// body past the frame limit is fatal for this session only.
async fn read_frames(mut read_half: OwnedReadHalf, addr: &str, lobby: &LobbyHandle, id: u32) {
    let mut header = [0u8; HEADER_SIZE];
    loop {
        match read_half.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                lobby.disconnected(id);
                return;
            }
            Err(e) => {
                tracing::warn!("could not read packet header from {addr}: {e}");
                lobby.disconnected(id);
                return;
            }
        }

        let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if size == 0 {
            lobby.frame(id, header.to_vec());
            continue;
        }
        if size > MAX_PACKET_SIZE - HEADER_SIZE {
            tracing::warn!("announced packet body is too big ({size} bytes) from {addr}");
            lobby.disconnected(id);
            return;
        }

        let mut frame = vec![0u8; HEADER_SIZE + size];
        frame[..HEADER_SIZE].copy_from_slice(&header);
        match read_half.read_exact(&mut frame[HEADER_SIZE..]).await {
            Ok(_) => lobby.frame(id, frame),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                lobby.disconnected(id);
                return;
            }
            Err(e) => {
                tracing::warn!("could not read packet body from {addr}: {e}");
                lobby.disconnected(id);
                return;
            }
        }
    }
}

/// Drains the outbound queue, writing every frame completely before the
/// next. Ends when the lobby drops the session handle or a write fails.
async fn write_frames(
    mut write_half: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<OutboundFrame>,
    addr: String,
    lobby: LobbyHandle,
    id: u32,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            tracing::warn!("could not send packet to {addr}: {e}");
            lobby.disconnected(id);
            return;
        }
    }
}
