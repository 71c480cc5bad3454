//! Wire format shared by the lobby server and its tests.
//!
//! The game client speaks a legacy framed binary protocol: a 14-byte
//! little-endian header (`size`, `cmd`, `id1`, `id2`) followed by `size`
//! bytes of payload. [`Packet`] gives sequential cursor-based access to one
//! frame and composes replies in place; [`cmd`] names the command codes;
//! [`handoff`] writes the nested key/value payload used for host migration.

pub mod cmd;
pub mod handoff;
pub mod packet;

pub use packet::{LenPrefix, Packet, PacketError};

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 14;

/// Upper bound for a whole frame (header included). A client announcing a
/// larger body is disconnected.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// TCP port the retail client expects the matchmaker on.
pub const DEFAULT_PORT: u16 = 31523;
