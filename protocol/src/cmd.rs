//! Command codes observed on the wire.
//!
//! Requests come from the client; the paired notification codes are what the
//! server composes in response. Codes with no constant here are ignored by
//! the dispatcher.

// Login and account flow.
pub const EMAIL_CHECK: u16 = 0x1a8;
pub const EMAIL_KNOWN: u16 = 0x1a9;
pub const REGISTER: u16 = 0x198;
pub const LOGIN: u16 = 0x19a;
pub const WELCOME: u16 = 0x19b;
pub const PLAYER_JOINED: u16 = 0x1a6;
pub const PLAYER_LEFT: u16 = 0x1a7;

// Player info exchange.
pub const PEER_INFO_REQUEST: u16 = 0x192;
pub const PEER_INFO: u16 = 0x193;
pub const PLAYER_STATUS: u16 = 0x1ab;
pub const PLAYER_STATUS_FWD: u16 = 0x1ac;
pub const VERSION_CHECK: u16 = 0x1ad;
pub const VERSION_INFO: u16 = 0x1ae;
pub const SET_PROPERTIES: u16 = 0x1b3;

// Room lifecycle.
pub const CREATE_ROOM: u16 = 0x19c;
pub const ROOM_CREATED: u16 = 0x19d;
pub const JOIN_ROOM: u16 = 0x19e;
pub const ROOM_JOINED: u16 = 0x19f;
pub const LEAVE_ROOM: u16 = 0x1a0;
pub const ROOM_LEFT: u16 = 0x1a1;
pub const START_GAME: u16 = 0x1a2;
pub const GAME_STARTED: u16 = 0x1a3;
pub const ROOM_UPDATED: u16 = 0x1a5;
pub const UPDATE_ROOM: u16 = 0x1aa;
pub const LEAVE_GAME: u16 = 0x1af;
pub const KICK_PLAYER: u16 = 0x1b5;
pub const PLAYER_KICKED: u16 = 0x1b6;
pub const ROOM_SETTINGS: u16 = 0x1bb;
pub const ROOM_SETTINGS_FWD: u16 = 0x1bc;
pub const HOST_HANDOFF: u16 = 0x1bd;
pub const NEW_HOST_NOTICE: u16 = 0x1be;

// Forwarded room/peer state (bodies are opaque to the server).
pub const VARIABLE_ARRAY: u16 = 0x032;
pub const ROOM_STATUS_A: u16 = 0x064;
pub const ROOM_STATUS_B: u16 = 0x065;
pub const ROOM_STATUS_ECHO: u16 = 0x066;
pub const ROOM_PROPS_BROADCAST: u16 = 0x0c8;
pub const ROOM_PROPS_DIRECT: u16 = 0x0c9;

// Chat.
pub const ROOM_MESSAGE: u16 = 0x194;
pub const ROOM_MESSAGE_FWD: u16 = 0x195;
pub const LOBBY_MESSAGE: u16 = 0x196;
pub const LOBBY_MESSAGE_FWD: u16 = 0x197;

// In-game data streaming.
pub const DATA_RECEIVED: u16 = 0x456;
pub const TRANSMISSION_DONE: u16 = 0x457;
pub const TRANSMISSION_DONE_HOST: u16 = 0x460;
pub const PLAYERS_LOADED: u16 = 0x461;
pub const GAME_DATA: u16 = 0x4b0;
