//! Cursor-based packet codec.
//!
//! A [`Packet`] owns one frame buffer and walks it with a seek cursor. The
//! same buffer serves both directions: the dispatcher reads the request from
//! it, rewinds, and composes the reply in place. [`Packet::write_header`]
//! then freezes the first `send_size` bytes as the outgoing wire image.

use crate::{HEADER_SIZE, MAX_PACKET_SIZE};
use thiserror::Error;

/// Width of the length prefix in front of a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenPrefix {
    U8,
    U16,
    U32,
}

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("frame of {0} bytes is shorter than the {HEADER_SIZE}-byte header")]
    TruncatedHeader(usize),
    #[error("read of {wanted} bytes at offset {at} passes the end of the packet")]
    ReadOverrun { at: usize, wanted: usize },
    #[error("write of {wanted} bytes at offset {at} would exceed the {MAX_PACKET_SIZE}-byte frame limit")]
    WriteOverflow { at: usize, wanted: usize },
    #[error("string of {0} bytes does not fit the length prefix")]
    StringTooLong(usize),
}

/// One wire frame with a read/write cursor.
pub struct Packet {
    buf: Vec<u8>,
    pos: usize,
    /// Bytes to transmit; set by [`Packet::write_header`], 0 until then.
    send_size: usize,
    size: u32,
    cmd: u16,
    id1: u32,
    id2: u32,
}

impl Packet {
    /// Wraps a received frame. Parses the header and leaves the cursor at
    /// the start of the data section.
    pub fn parse(buf: Vec<u8>) -> Result<Self, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::TruncatedHeader(buf.len()));
        }
        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let cmd = u16::from_le_bytes([buf[4], buf[5]]);
        let id1 = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let id2 = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
        Ok(Self {
            buf,
            pos: HEADER_SIZE,
            send_size: 0,
            size,
            cmd,
            id1,
            id2,
        })
    }

    /// Starts a fresh frame with an empty data section, e.g. for packets the
    /// server originates itself.
    pub fn compose(cmd: u16, id1: u32, id2: u32) -> Self {
        let mut p = Self {
            buf: vec![0; HEADER_SIZE],
            pos: HEADER_SIZE,
            send_size: 0,
            size: 0,
            cmd,
            id1,
            id2,
        };
        p.write_header(cmd, id1, id2);
        p
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn cmd(&self) -> u16 {
        self.cmd
    }

    pub fn id1(&self) -> u32 {
        self.id1
    }

    pub fn id2(&self) -> u32 {
        self.id2
    }

    /// Total bytes to put on the wire. 0 until [`Packet::write_header`].
    pub fn send_size(&self) -> usize {
        self.send_size
    }

    /// The finished wire image. Call after [`Packet::write_header`].
    pub fn wire(&self) -> &[u8] {
        &self.buf[..self.send_size]
    }

    fn data_end(&self) -> usize {
        HEADER_SIZE + self.size as usize
    }

    /// Moves the cursor to the start of the data section.
    pub fn seek_to_start(&mut self) {
        self.pos = HEADER_SIZE;
    }

    /// Moves the cursor past the announced data section.
    pub fn seek_to_end(&mut self) {
        self.pos = self.data_end();
    }

    /// Advances the cursor without touching the bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], PacketError> {
        let end = self.data_end().min(self.buf.len());
        if self.pos + n > end {
            return Err(PacketError::ReadOverrun {
                at: self.pos,
                wanted: n,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a length-prefixed string as raw bytes. The client encodes names
    /// in its local codepage, so no UTF-8 is assumed.
    pub fn read_string(&mut self, prefix: LenPrefix) -> Result<Vec<u8>, PacketError> {
        let len = match prefix {
            LenPrefix::U8 => self.read_u8()? as usize,
            LenPrefix::U16 => self.read_u16()? as usize,
            LenPrefix::U32 => self.read_u32()? as usize,
        };
        Ok(self.take(len)?.to_vec())
    }

    fn reserve(&mut self, n: usize) -> Result<usize, PacketError> {
        let end = self.pos + n;
        if end > MAX_PACKET_SIZE {
            return Err(PacketError::WriteOverflow {
                at: self.pos,
                wanted: n,
            });
        }
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        let at = self.pos;
        self.pos = end;
        Ok(at)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), PacketError> {
        let at = self.reserve(1)?;
        self.buf[at] = v;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), PacketError> {
        let at = self.reserve(2)?;
        self.buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), PacketError> {
        let at = self.reserve(4)?;
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn write_string(&mut self, s: &[u8], prefix: LenPrefix) -> Result<(), PacketError> {
        match prefix {
            LenPrefix::U8 => {
                let len = u8::try_from(s.len()).map_err(|_| PacketError::StringTooLong(s.len()))?;
                self.write_u8(len)?;
            }
            LenPrefix::U16 => {
                let len =
                    u16::try_from(s.len()).map_err(|_| PacketError::StringTooLong(s.len()))?;
                self.write_u16(len)?;
            }
            LenPrefix::U32 => {
                let len =
                    u32::try_from(s.len()).map_err(|_| PacketError::StringTooLong(s.len()))?;
                self.write_u32(len)?;
            }
        }
        let at = self.reserve(s.len())?;
        self.buf[at..at + s.len()].copy_from_slice(s);
        Ok(())
    }

    /// Finishes composition: snapshots the cursor as the frame length,
    /// rewrites the header, and leaves the cursor at the start of the data
    /// section (payloads with a leading back-patched length rely on that).
    pub fn write_header(&mut self, cmd: u16, id1: u32, id2: u32) {
        self.send_size = self.pos;
        self.size = (self.send_size - HEADER_SIZE) as u32;
        self.cmd = cmd;
        self.id1 = id1;
        self.id2 = id2;
        self.buf[0..4].copy_from_slice(&self.size.to_le_bytes());
        self.buf[4..6].copy_from_slice(&cmd.to_le_bytes());
        self.buf[6..10].copy_from_slice(&id1.to_le_bytes());
        self.buf[10..14].copy_from_slice(&id2.to_le_bytes());
        self.pos = HEADER_SIZE;
    }

    /// Forwards the frame unchanged apart from the command code, keeping
    /// `id1`/`id2` as received.
    pub fn forward_as(&mut self, cmd: u16) {
        self.seek_to_end();
        let (id1, id2) = (self.id1, self.id2);
        self.write_header(cmd, id1, id2);
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet {{ cmd: {:#x}, id1: {}, id2: {}, size: {} }}",
            self.cmd, self.id1, self.id2, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(cmd: u16, id1: u32, id2: u32, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&cmd.to_le_bytes());
        buf.extend_from_slice(&id1.to_le_bytes());
        buf.extend_from_slice(&id2.to_le_bytes());
        buf.extend_from_slice(data);
        buf
    }

    #[test]
    fn parse_reads_header_fields() {
        let p = Packet::parse(frame(0x19a, 7, 0, b"abc")).unwrap();
        assert_eq!(p.cmd(), 0x19a);
        assert_eq!(p.id1(), 7);
        assert_eq!(p.id2(), 0);
        assert_eq!(p.size(), 3);
    }

    #[test]
    fn parse_rejects_short_frame() {
        assert!(matches!(
            Packet::parse(vec![0; 5]),
            Err(PacketError::TruncatedHeader(5))
        ));
    }

    #[test]
    fn header_round_trip() {
        let mut p = Packet::compose(0, 0, 0);
        p.write_u32(0xdead_beef).unwrap();
        p.write_header(0x1a3, 12, 34);

        let q = Packet::parse(p.wire().to_vec()).unwrap();
        assert_eq!(q.cmd(), 0x1a3);
        assert_eq!(q.id1(), 12);
        assert_eq!(q.id2(), 34);
        assert_eq!(q.size(), 4);
    }

    #[test]
    fn string_round_trip_all_prefix_widths() {
        for prefix in [LenPrefix::U8, LenPrefix::U16, LenPrefix::U32] {
            let mut p = Packet::compose(0, 0, 0);
            p.write_string(b"historical battle", prefix).unwrap();
            p.write_header(1, 0, 0);

            let mut q = Packet::parse(p.wire().to_vec()).unwrap();
            assert_eq!(q.read_string(prefix).unwrap(), b"historical battle");
        }
    }

    #[test]
    fn integers_are_little_endian() {
        let mut p = Packet::compose(0, 0, 0);
        p.write_u16(0x0102).unwrap();
        p.write_u32(0x0304_0506).unwrap();
        p.write_header(0, 0, 0);
        assert_eq!(&p.wire()[HEADER_SIZE..], &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn read_past_announced_end_fails() {
        let mut p = Packet::parse(frame(1, 0, 0, &[0xaa, 0xbb])).unwrap();
        assert_eq!(p.read_u8().unwrap(), 0xaa);
        assert!(p.read_u32().is_err());
    }

    #[test]
    fn string_read_respects_announced_end() {
        // Length prefix promises more bytes than the packet carries.
        let mut p = Packet::parse(frame(1, 0, 0, &[10, b'x'])).unwrap();
        assert!(matches!(
            p.read_string(LenPrefix::U8),
            Err(PacketError::ReadOverrun { .. })
        ));
    }

    #[test]
    fn write_past_frame_limit_fails() {
        let mut p = Packet::compose(1, 0, 0);
        p.skip(MAX_PACKET_SIZE - HEADER_SIZE - 2);
        assert!(p.write_u16(0).is_ok());
        assert!(matches!(
            p.write_u8(0),
            Err(PacketError::WriteOverflow { .. })
        ));
    }

    #[test]
    fn forward_keeps_body_and_ids_swaps_cmd() {
        let original = frame(0x194, 5, 9, b"2|hello");
        let mut p = Packet::parse(original.clone()).unwrap();
        p.forward_as(0x195);

        let mut expected = original;
        expected[4..6].copy_from_slice(&0x195u16.to_le_bytes());
        assert_eq!(p.wire(), &expected[..]);
    }

    #[test]
    fn compose_is_header_only() {
        let p = Packet::compose(0x1a7, 3, 0);
        assert_eq!(p.send_size(), HEADER_SIZE);
        assert_eq!(p.size(), 0);
    }

    #[test]
    fn write_header_leaves_cursor_at_data_start() {
        let mut p = Packet::compose(0, 0, 0);
        p.write_u32(0).unwrap();
        p.write_u32(7).unwrap();
        p.write_header(0x1bd, 1, 1);
        // The next write lands on the first data byte.
        p.write_u32(0x11223344).unwrap();
        assert_eq!(&p.wire()[HEADER_SIZE..HEADER_SIZE + 4], &0x11223344u32.to_le_bytes());
    }
}
