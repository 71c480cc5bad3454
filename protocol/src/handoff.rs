//! Host-migration payload for `HOST_HANDOFF` (0x1bd).
//!
//! When an in-game host drops, the promoted peer receives a snapshot of the
//! room as a nested key/value dictionary: int-prefixed strings for
//! `gamename`, `mapname`, `master`, `session` and `clients`, plus one
//! `clientslist` array of `("*", decimal id)` items. The payload opens with
//! a total-length u32 that is back-patched once the frame size is known.

use crate::packet::{LenPrefix, Packet, PacketError};

/// The `session` value the real master server derives from somewhere
/// unknown; a fixed stand-in works on LAN (see design notes).
const SESSION_ID: &[u8] = b"1337";

fn write_pair(p: &mut Packet, key: &[u8], value: &[u8]) -> Result<(), PacketError> {
    p.write_string(key, LenPrefix::U32)?;
    p.write_string(value, LenPrefix::U32)?;
    p.write_u32(0)
}

/// Writes the dictionary body into `p`, starting at the data section.
///
/// `members` are the room members that stay behind, in join order, with the
/// departing host already excluded and the new host still included. The
/// caller finishes the frame with `write_header` and then back-patches the
/// leading length with `size - 4`.
pub fn write_room_snapshot(
    p: &mut Packet,
    description: &[u8],
    info: &[u8],
    new_host_id: u32,
    members: &[u32],
) -> Result<(), PacketError> {
    p.seek_to_start();
    p.skip(4); // total length, back-patched after write_header
    p.write_u32(0)?;
    p.write_u32(1)?;
    p.write_u8(0)?;
    p.write_u32(6)?;

    write_pair(p, b"gamename", description)?;
    write_pair(p, b"mapname", info)?;
    write_pair(p, b"master", new_host_id.to_string().as_bytes())?;
    write_pair(p, b"session", SESSION_ID)?;
    write_pair(p, b"clients", members.len().to_string().as_bytes())?;

    p.write_string(b"clientslist", LenPrefix::U32)?;
    p.write_u32(1)?;
    p.write_u8(0)?;
    p.write_u32(members.len() as u32)?;
    for &id in members {
        p.write_string(b"*", LenPrefix::U32)?;
        p.write_string(id.to_string().as_bytes(), LenPrefix::U32)?;
    }
    p.write_u32(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd;
    use crate::HEADER_SIZE;

    fn read_pair(p: &mut Packet) -> (Vec<u8>, Vec<u8>) {
        let key = p.read_string(LenPrefix::U32).unwrap();
        let value = p.read_string(LenPrefix::U32).unwrap();
        assert_eq!(p.read_u32().unwrap(), 0, "pair separator");
        (key, value)
    }

    #[test]
    fn snapshot_layout() {
        let mut p = Packet::compose(0, 0, 0);
        write_room_snapshot(&mut p, b"\"r1\"\t\"\"\t008C7", b"1|2|0|0|0|0", 3, &[2, 3]).unwrap();
        p.write_header(cmd::HOST_HANDOFF, 3, 3);
        p.write_u32(p.size() - 4).unwrap();

        let mut q = Packet::parse(p.wire().to_vec()).unwrap();
        let total = q.read_u32().unwrap();
        assert_eq!(total, q.size() - 4);
        assert_eq!(q.read_u32().unwrap(), 0);
        assert_eq!(q.read_u32().unwrap(), 1);
        assert_eq!(q.read_u8().unwrap(), 0);
        assert_eq!(q.read_u32().unwrap(), 6);

        assert_eq!(
            read_pair(&mut q),
            (b"gamename".to_vec(), b"\"r1\"\t\"\"\t008C7".to_vec())
        );
        assert_eq!(read_pair(&mut q), (b"mapname".to_vec(), b"1|2|0|0|0|0".to_vec()));
        assert_eq!(read_pair(&mut q), (b"master".to_vec(), b"3".to_vec()));
        assert_eq!(read_pair(&mut q), (b"session".to_vec(), b"1337".to_vec()));
        assert_eq!(read_pair(&mut q), (b"clients".to_vec(), b"2".to_vec()));

        assert_eq!(q.read_string(LenPrefix::U32).unwrap(), b"clientslist");
        assert_eq!(q.read_u32().unwrap(), 1);
        assert_eq!(q.read_u8().unwrap(), 0);
        assert_eq!(q.read_u32().unwrap(), 2);
        for expected in ["2", "3"] {
            assert_eq!(q.read_string(LenPrefix::U32).unwrap(), b"*");
            assert_eq!(
                q.read_string(LenPrefix::U32).unwrap(),
                expected.as_bytes()
            );
        }
        assert_eq!(q.read_u32().unwrap(), 0);
    }

    #[test]
    fn skipped_length_slot_is_zero_before_backpatch() {
        let mut p = Packet::compose(0, 0, 0);
        write_room_snapshot(&mut p, b"d", b"i", 1, &[1]).unwrap();
        p.write_header(cmd::HOST_HANDOFF, 1, 1);
        assert_eq!(&p.wire()[HEADER_SIZE..HEADER_SIZE + 4], &[0, 0, 0, 0]);
    }
}
