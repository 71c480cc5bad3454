//! Registry, command dispatch and fan-out routing.
//!
//! All lobby state sits behind one mailbox. Sessions post connect, frame
//! and disconnect events; the lobby task drains them serially, so every
//! dispatch sees a consistent snapshot and never races another mutation.
//! Replies are composed in the inbound frame's own buffer, then copied once
//! into a shared slice and queued to every recipient.

use std::collections::BTreeMap;
use std::sync::Arc;

use lan_lobby_protocol::{cmd, handoff, LenPrefix, Packet, PacketError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::player::{self, status, Player};
use crate::room::Room;
use crate::session::{OutboundFrame, SessionHandle};

/// Events a session can post to the lobby.
enum LobbyMessage {
    /// New TCP connection; the lobby assigns and returns the client id.
    Connected {
        addr: String,
        queue: mpsc::UnboundedSender<OutboundFrame>,
        reply: oneshot::Sender<u32>,
    },
    /// One complete inbound frame (header plus announced body).
    Frame { id: u32, frame: Vec<u8> },
    /// The connection is gone (EOF, I/O error or protocol violation).
    Disconnected { id: u32 },
}

/// Cloneable mailbox address of the lobby task.
#[derive(Clone)]
pub struct LobbyHandle {
    tx: mpsc::UnboundedSender<LobbyMessage>,
}

impl LobbyHandle {
    /// Registers a connection and waits for its assigned client id.
    /// `None` means the lobby task is gone.
    pub async fn connect(
        &self,
        addr: String,
        queue: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Option<u32> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(LobbyMessage::Connected { addr, queue, reply })
            .ok()?;
        reply_rx.await.ok()
    }

    pub fn frame(&self, id: u32, frame: Vec<u8>) {
        let _ = self.tx.send(LobbyMessage::Frame { id, frame });
    }

    pub fn disconnected(&self, id: u32) {
        let _ = self.tx.send(LobbyMessage::Disconnected { id });
    }
}

/// Recipients of one composed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendTo {
    Source,
    Id2,
    Everyone,
    EveryoneButSource,
    RoomHost,
    EveryoneInRoom,
    EveryoneInRoomButSource,
    /// The host fans out to the other members; a member funnels to the host.
    PropagateInRoom,
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("no player for client {0}")]
    UnknownPlayer(u32),
    #[error("no room hosted by client {0}")]
    UnknownRoom(u32),
}

/// The server's single registry: connections, logged-in players and rooms,
/// all keyed by the client id issued at connect time.
pub struct Lobby {
    clients: BTreeMap<u32, SessionHandle>,
    players: BTreeMap<u32, Player>,
    rooms: BTreeMap<u32, Room>,
    /// Monotonic for the process lifetime; 0 stays reserved as "nobody".
    last_issued_id: u32,
}

impl Lobby {
    fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
            players: BTreeMap::new(),
            rooms: BTreeMap::new(),
            last_issued_id: 0,
        }
    }

    /// Spawns the lobby task and returns its mailbox address.
    pub fn spawn() -> LobbyHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lobby = Lobby::new();
            while let Some(msg) = rx.recv().await {
                lobby.handle_message(msg);
            }
        });
        LobbyHandle { tx }
    }

    fn handle_message(&mut self, msg: LobbyMessage) {
        match msg {
            LobbyMessage::Connected { addr, queue, reply } => {
                self.last_issued_id += 1;
                let id = self.last_issued_id;
                self.clients
                    .insert(id, SessionHandle::new(id, addr, queue));
                let _ = reply.send(id);
            }
            LobbyMessage::Frame { id, frame } => match Packet::parse(frame) {
                Ok(packet) => self.process(id, packet),
                Err(e) => {
                    tracing::warn!("unreadable frame from client {id}: {e}");
                    self.disconnect(id);
                }
            },
            LobbyMessage::Disconnected { id } => self.disconnect(id),
        }
    }

    fn process(&mut self, src: u32, mut p: Packet) {
        tracing::debug!("{src}: {:#05x}", p.cmd());
        match self.dispatch(src, &mut p) {
            Ok(()) => {}
            Err(DispatchError::Packet(e)) => {
                // Malformed or oversized composition; only this client pays.
                tracing::warn!("dropping client {src}: {e}");
                self.disconnect(src);
            }
            Err(e) => {
                tracing::warn!("packet {:#05x} from client {src} not handled: {e}", p.cmd());
            }
        }
    }

    /// Gracefully removes a client. Safe to call more than once; later
    /// calls are no-ops because the session entry is already gone.
    fn disconnect(&mut self, id: u32) {
        let Some(session) = self.clients.remove(&id) else {
            return;
        };
        tracing::info!("Client disconnected: {}", session.addr());

        // Nothing to announce if the client never logged in.
        if !self.players.contains_key(&id) {
            return;
        }

        // Replay the leave-room flow so departure notifications and host
        // migration fire exactly as for a voluntary leave.
        if self.players.get(&id).and_then(Player::room).is_some() {
            let mut p = Packet::compose(cmd::LEAVE_ROOM, id, 0);
            if let Err(e) = self.dispatch(id, &mut p) {
                tracing::warn!("leave-room replay for client {id} failed: {e}");
            }
        }

        self.players.remove(&id);

        let p = Packet::compose(cmd::PLAYER_LEFT, id, 0);
        self.send(&p, id, SendTo::Everyone);
    }

    /// Parses and reacts to one packet. Reads the request sequentially from
    /// the frame, then rewinds and composes the reply over the same bytes.
    fn dispatch(&mut self, src: u32, p: &mut Packet) -> Result<(), DispatchError> {
        let (id1, id2) = (p.id1(), p.id2());

        match p.cmd() {
            // ---------------------------------------------------------------
            // In-game data streams: bodies are opaque, only routing matters.
            // ---------------------------------------------------------------
            cmd::GAME_DATA | cmd::DATA_RECEIVED => {
                let c = p.cmd();
                p.forward_as(c);
                self.send(p, src, SendTo::PropagateInRoom);
            }
            cmd::VARIABLE_ARRAY | cmd::TRANSMISSION_DONE | cmd::PLAYERS_LOADED => {
                let c = p.cmd();
                p.forward_as(c);
                self.send(p, src, SendTo::EveryoneInRoomButSource);
            }
            cmd::ROOM_STATUS_A | cmd::ROOM_STATUS_B | cmd::TRANSMISSION_DONE_HOST => {
                let c = p.cmd();
                p.forward_as(c);
                self.send(p, src, SendTo::RoomHost);
            }
            cmd::ROOM_STATUS_ECHO => {
                p.forward_as(cmd::ROOM_STATUS_ECHO);
                self.send(p, src, SendTo::Source);
            }

            // ---------------------------------------------------------------
            // Information exchange.
            // ---------------------------------------------------------------
            cmd::PEER_INFO_REQUEST => {
                let info_id = p.read_u32()?;
                let target = self
                    .players
                    .get(&info_id)
                    .ok_or(DispatchError::UnknownPlayer(info_id))?;

                p.seek_to_start();
                p.write_u32(info_id)?;
                p.write_u8(target.status())?;
                p.write_string(target.name().as_bytes(), LenPrefix::U8)?;
                p.write_u8(0)?; // no ranked score string on LAN
                for _ in 0..5 {
                    p.write_u32(0)?;
                }
                p.write_string(target.props(), LenPrefix::U8)?;
                p.write_header(cmd::PEER_INFO, info_id, id1);
                self.send(p, src, SendTo::Source);
            }
            cmd::PLAYER_STATUS => {
                p.forward_as(cmd::PLAYER_STATUS_FWD);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::VERSION_CHECK => {
                let player = self
                    .players
                    .get(&src)
                    .ok_or(DispatchError::UnknownPlayer(src))?;
                p.write_string(player.ver1(), LenPrefix::U8)?;
                p.write_string(player.ver2(), LenPrefix::U8)?;
                p.write_u32(0)?;
                let id = player.id();
                p.write_header(cmd::VERSION_INFO, 0, id);
                self.send(p, src, SendTo::Source);
            }
            cmd::SET_PROPERTIES => {
                p.read_string(LenPrefix::U8)?; // password
                p.read_string(LenPrefix::U8)?; // nickname
                p.read_string(LenPrefix::U8)?; // score
                let props = p.read_string(LenPrefix::U8)?;
                self.players
                    .get_mut(&src)
                    .ok_or(DispatchError::UnknownPlayer(src))?
                    .set_props(props);
                // No reply: an acknowledgement makes the client repaint the
                // status column with stale values.
            }
            0x1b7 => {
                // Two copies of the sender's id; purpose unknown, no
                // reaction observed from the retail server either.
            }

            // ---------------------------------------------------------------
            // Rooms.
            // ---------------------------------------------------------------
            cmd::ROOM_PROPS_BROADCAST => {
                p.forward_as(cmd::ROOM_PROPS_BROADCAST);
                self.send(p, src, SendTo::EveryoneButSource);
            }
            cmd::ROOM_PROPS_DIRECT => {
                p.forward_as(cmd::ROOM_PROPS_DIRECT);
                self.send(p, src, SendTo::Id2);
            }
            cmd::CREATE_ROOM => {
                p.skip(5); // constant 8 plus a zero byte
                let desc = p.read_string(LenPrefix::U8)?;
                let info = p.read_string(LenPrefix::U8)?;
                let magic = p.read_u32()?;

                self.rooms
                    .entry(src)
                    .or_insert_with(|| Room::new(src, desc.clone()));
                self.join_room(src, src)?;

                p.seek_to_start();
                p.write_u8(7)?;
                p.write_u32(8)?;
                p.write_string(&desc, LenPrefix::U8)?;
                p.write_string(&info, LenPrefix::U8)?;
                p.write_u32(magic)?; // echoed back; meaning unknown
                p.write_u16(0)?;
                p.write_header(cmd::ROOM_CREATED, id1, 0);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::JOIN_ROOM => {
                let room_key = p.read_u32()?;
                let new_status = self.join_room(src, room_key)?;

                p.seek_to_start();
                p.write_u32(room_key)?;
                p.write_u8(new_status)?;
                p.write_header(cmd::ROOM_JOINED, id1, 0);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::LEAVE_ROOM => self.leave_room(src, p, id1)?,
            cmd::START_GAME => {
                let player = self
                    .players
                    .get(&src)
                    .ok_or(DispatchError::UnknownPlayer(src))?;
                let Some(room_key) = player.room() else {
                    return Ok(());
                };
                let members = {
                    let room = self
                        .rooms
                        .get_mut(&room_key)
                        .ok_or(DispatchError::UnknownRoom(room_key))?;
                    room.hide_from_lobby();
                    room.members().to_vec()
                };

                p.write_u32(members.len() as u32)?;
                for &m in members.iter().rev() {
                    let pl = self
                        .players
                        .get_mut(&m)
                        .ok_or(DispatchError::UnknownPlayer(m))?;
                    pl.set_status(if m == src {
                        status::GAME_HOST
                    } else {
                        status::GAME_MEMBER
                    });
                    p.write_u32(m)?;
                    p.write_u8(pl.status())?;
                }
                p.write_header(cmd::GAME_STARTED, id1, 0);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::UPDATE_ROOM => {
                let desc = p.read_string(LenPrefix::U8)?;
                let info = p.read_string(LenPrefix::U8)?;
                let player = self
                    .players
                    .get(&src)
                    .ok_or(DispatchError::UnknownPlayer(src))?;
                let Some(room_key) = player.room() else {
                    return Ok(());
                };
                let members = {
                    let room = self
                        .rooms
                        .get_mut(&room_key)
                        .ok_or(DispatchError::UnknownRoom(room_key))?;
                    // The description never changes; the info string is
                    // stored as sent, structure unchecked.
                    room.set_info(info.clone());
                    room.members().to_vec()
                };

                p.seek_to_start();
                p.write_u32(8)?;
                p.write_string(&desc, LenPrefix::U8)?;
                p.write_string(&info, LenPrefix::U8)?;
                p.write_u32(0)?;
                p.write_u16(0)?;
                p.write_u32(members.len() as u32)?;
                for &m in members.iter().rev() {
                    let st = self
                        .players
                        .get(&m)
                        .ok_or(DispatchError::UnknownPlayer(m))?
                        .status();
                    p.write_u32(m)?;
                    p.write_u8(st)?;
                }
                p.write_header(cmd::ROOM_UPDATED, id1, 0);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::LEAVE_GAME => {
                p.forward_as(cmd::LEAVE_GAME);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::KICK_PLAYER => {
                let kicked = p.read_u32()?;
                p.forward_as(cmd::PLAYER_KICKED);
                self.send(p, src, SendTo::Everyone);

                // The kicked client answers with its own leave, which does
                // the real cleanup; this frees the slot in everyone's UI.
                p.seek_to_start();
                p.write_u8(0)?;
                p.write_u32(1)?;
                p.write_u32(kicked)?;
                p.write_u8(1)?;
                p.write_header(cmd::ROOM_LEFT, kicked, 0);
                self.send(p, src, SendTo::Everyone);
            }
            cmd::ROOM_SETTINGS => {
                p.forward_as(cmd::ROOM_SETTINGS_FWD);
                self.send(p, src, SendTo::EveryoneInRoom);
            }

            // ---------------------------------------------------------------
            // Messaging.
            // ---------------------------------------------------------------
            cmd::ROOM_MESSAGE => {
                p.forward_as(cmd::ROOM_MESSAGE_FWD);
                self.send(p, src, SendTo::EveryoneInRoom);
            }
            cmd::LOBBY_MESSAGE => {
                p.forward_as(cmd::LOBBY_MESSAGE_FWD);
                if id2 == 0 {
                    // Public message.
                    self.send(p, src, SendTo::Everyone);
                } else if id1 == id2 {
                    // System echo.
                    self.send(p, src, SendTo::Source);
                } else {
                    // Private message: sender and recipient each get a copy.
                    self.send(p, src, SendTo::Source);
                    self.send(p, src, SendTo::Id2);
                }
            }

            // ---------------------------------------------------------------
            // Login.
            // ---------------------------------------------------------------
            cmd::EMAIL_CHECK => {
                p.seek_to_end();
                p.write_u8(1)?; // every email is "registered" on LAN
                p.write_header(cmd::EMAIL_KNOWN, 0, 0);
                self.send(p, src, SendTo::Source);
            }
            cmd::REGISTER => {
                // Nothing to register against; the client proceeds anyway.
            }
            cmd::LOGIN => self.login(src, p)?,

            other => {
                tracing::debug!("unknown packet {other:#05x} from client {src}: {p:?}");
            }
        }
        Ok(())
    }

    /// Login handshake: records the player, answers with the lobby snapshot
    /// and announces the newcomer to everyone.
    fn login(&mut self, src: u32, p: &mut Packet) -> Result<(), DispatchError> {
        let ver1 = p.read_string(LenPrefix::U8)?;
        let ver2 = p.read_string(LenPrefix::U8)?;
        let skip = p.read_u8()? as usize;
        p.skip(skip); // email
        let skip = p.read_u8()? as usize;
        p.skip(skip); // password
        // The game-key field doubles as the nickname: it is the least
        // restrictive input the stock client offers.
        let raw_name = p.read_string(LenPrefix::U8)?;

        let player = Player::new(src, player::normalize_name(&raw_name), ver1, ver2);

        // Welcome packet: own record, everyone already logged in, then open
        // rooms in reverse key order with member lists reversed. Hidden
        // rooms (running games) are skipped.
        p.seek_to_start();
        p.write_u8(0)?;
        p.write_string(player.name().as_bytes(), LenPrefix::U8)?;
        p.write_u8(0)?;
        p.write_u32(0)?; // score
        for _ in 0..4 {
            p.write_u32(0)?;
        }
        p.write_string(player.props(), LenPrefix::U8)?;
        for (id, pl) in &self.players {
            p.write_u32(*id)?;
            p.write_u8(pl.status())?;
            p.write_string(pl.name().as_bytes(), LenPrefix::U8)?;
            p.write_u8(0)?;
            p.write_string(pl.props(), LenPrefix::U8)?;
        }
        p.write_u32(0)?;
        for (id, room) in self.rooms.iter().rev() {
            if room.is_hidden() {
                continue;
            }
            p.write_u32(*id)?;
            p.write_u32(8)?;
            p.write_string(room.description(), LenPrefix::U8)?;
            p.write_string(room.info(), LenPrefix::U8)?;
            p.write_u32(0)?;
            p.write_u16(0)?;
            p.write_u32(room.members().len() as u32)?;
            for &m in room.members().iter().rev() {
                p.write_u32(m)?;
            }
        }
        p.write_u32(0)?;
        p.write_header(cmd::WELCOME, src, src);
        self.send(p, src, SendTo::Source);

        // Lobby-wide announcement; the newcomer needs it too.
        p.seek_to_start();
        p.write_string(player.name().as_bytes(), LenPrefix::U8)?;
        p.write_u8(0)?;
        p.write_string(player.props(), LenPrefix::U8)?;
        p.write_u8(player.status())?;
        p.write_header(cmd::PLAYER_JOINED, src, 0);

        tracing::info!("player {} logged in as client {src}", player.name());
        self.players.insert(src, player);
        self.send(p, src, SendTo::Everyone);
        Ok(())
    }

    /// Leave handling, also replayed on disconnect. A departing host
    /// dissolves the room; a departing in-game host with peers left behind
    /// additionally hands the session over to the last member.
    fn leave_room(&mut self, src: u32, p: &mut Packet, id1: u32) -> Result<(), DispatchError> {
        let player = self
            .players
            .get(&src)
            .ok_or(DispatchError::UnknownPlayer(src))?;
        // Members of a dissolved room echo the leave; nothing left to do.
        let Some(room_key) = player.room() else {
            return Ok(());
        };
        let room = self
            .rooms
            .get(&room_key)
            .ok_or(DispatchError::UnknownRoom(room_key))?;
        let members = room.members().to_vec();
        let st = player.status();

        let host_leaving = matches!(st, status::ROOM_HOST | status::GAME_HOST);
        // AI armies can keep a game going for a single human, so the
        // handoff depends only on the in-game flag and the member count.
        let transfer_needed = st == status::GAME_HOST && members.len() > 1;
        let new_host_id = members.last().copied().unwrap_or(src);

        if host_leaving {
            // One notification covers the whole room.
            p.write_u8(1)?;
            p.write_u32(members.len() as u32)?;
            for &m in &members {
                let pl = self
                    .players
                    .get_mut(&m)
                    .ok_or(DispatchError::UnknownPlayer(m))?;
                pl.leave_room();
                p.write_u32(m)?;
                p.write_u8(pl.status())?;
            }
            if let Some(room) = self.rooms.get_mut(&room_key) {
                room.clear_members();
            }
        } else {
            let pl = self
                .players
                .get_mut(&src)
                .ok_or(DispatchError::UnknownPlayer(src))?;
            pl.leave_room();
            let left_status = pl.status();
            if let Some(room) = self.rooms.get_mut(&room_key) {
                room.remove_member(src);
            }
            p.write_u8(0)?;
            p.write_u32(1)?;
            p.write_u32(src)?;
            p.write_u8(left_status)?;
        }
        p.write_header(cmd::ROOM_LEFT, id1, 0);
        self.send(p, src, SendTo::Everyone);

        if transfer_needed {
            let (desc, info) = {
                let room = self
                    .rooms
                    .get(&room_key)
                    .ok_or(DispatchError::UnknownRoom(room_key))?;
                (room.description().to_vec(), room.info().to_vec())
            };
            // The departing host sits at index 0; everyone after it stays.
            let remaining = &members[1..];

            handoff::write_room_snapshot(p, &desc, &info, new_host_id, remaining)?;
            p.write_header(cmd::HOST_HANDOFF, new_host_id, new_host_id);
            let total = p.size() - 4;
            p.write_u32(total)?; // back-patch the leading length
            self.send(p, src, SendTo::Id2);

            p.seek_to_start();
            for &m in remaining {
                if m == new_host_id {
                    continue;
                }
                p.write_header(cmd::NEW_HOST_NOTICE, new_host_id, m);
                self.send(p, src, SendTo::Id2);
            }
        }

        if host_leaving {
            // The promoted host re-registers the room once it has applied
            // the snapshot; the stale entry goes either way.
            self.rooms.remove(&room_key);
        }
        Ok(())
    }

    /// Links a player into a room on both sides of the relation.
    fn join_room(&mut self, player_id: u32, room_key: u32) -> Result<u8, DispatchError> {
        let host_id = self
            .rooms
            .get(&room_key)
            .ok_or(DispatchError::UnknownRoom(room_key))?
            .host_id();
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(DispatchError::UnknownPlayer(player_id))?;
        player.enter_room(room_key, host_id == player_id);
        let new_status = player.status();
        if let Some(room) = self.rooms.get_mut(&room_key) {
            room.add_member(player_id);
        }
        Ok(new_status)
    }

    /// Copies the composed frame into one shared slice and queues it to
    /// every recipient. A recipient that disappeared mid-flight is skipped
    /// with a warning; the rest still get their copy.
    fn send(&self, p: &Packet, src: u32, target: SendTo) {
        let send_size = p.send_size();
        debug_assert!(send_size > 0, "send() before write_header()");
        if send_size == 0 {
            return;
        }
        let frame: OutboundFrame = Arc::from(p.wire());

        match target {
            SendTo::Source => self.queue_to(src, &frame),
            SendTo::Id2 => self.queue_to(p.id2(), &frame),
            SendTo::Everyone => {
                for session in self.clients.values() {
                    session.queue_buf(frame.clone());
                }
            }
            SendTo::EveryoneButSource => {
                for (&id, session) in &self.clients {
                    if id != src {
                        session.queue_buf(frame.clone());
                    }
                }
            }
            SendTo::RoomHost
            | SendTo::EveryoneInRoom
            | SendTo::EveryoneInRoomButSource
            | SendTo::PropagateInRoom => {
                let Some(room) = self
                    .players
                    .get(&src)
                    .and_then(Player::room)
                    .and_then(|key| self.rooms.get(&key))
                else {
                    tracing::warn!(
                        "cannot route {:#05x}: client {src} is not in a room",
                        p.cmd()
                    );
                    return;
                };
                match target {
                    SendTo::RoomHost => self.queue_to(room.host_id(), &frame),
                    SendTo::EveryoneInRoom => {
                        for &m in room.members() {
                            self.queue_to(m, &frame);
                        }
                    }
                    SendTo::EveryoneInRoomButSource => {
                        for &m in room.members() {
                            if m != src {
                                self.queue_to(m, &frame);
                            }
                        }
                    }
                    SendTo::PropagateInRoom => {
                        if src == room.host_id() {
                            for &m in room.members() {
                                if m != src {
                                    self.queue_to(m, &frame);
                                }
                            }
                        } else {
                            self.queue_to(room.host_id(), &frame);
                        }
                    }
                    _ => unreachable!(),
                }
            }
        }
    }

    fn queue_to(&self, id: u32, frame: &OutboundFrame) {
        match self.clients.get(&id) {
            Some(session) => session.queue_buf(frame.clone()),
            None => tracing::warn!("dropping delivery: client {id} is gone"),
        }
    }
}
