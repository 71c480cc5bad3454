//! Per-login client state.

/// Status bytes as the client UI understands them.
pub mod status {
    /// Logged in, not in any room.
    pub const LOBBY: u8 = 0x01;
    /// Member of a pre-game room.
    pub const ROOM_MEMBER: u8 = 0x03;
    /// Hosting a pre-game room.
    pub const ROOM_HOST: u8 = 0x05;
    /// Playing in a started game.
    pub const GAME_MEMBER: u8 = 0x0b;
    /// Hosting a started game.
    pub const GAME_HOST: u8 = 0x0f;
}

/// Properties string reported for every player. The retail server fills in
/// purchase and DLC flags; fixed values are fine on LAN.
pub const DEFAULT_PROPS: &[u8] = b"pur|0|dlc|0|ram|4";

/// A logged-in client. Created on the login command, dropped on disconnect.
///
/// The room link is the hosting client's id, resolved through the lobby's
/// room map at use sites; holding a key instead of a reference lets the room
/// disappear while former members linger.
pub struct Player {
    id: u32,
    name: String,
    /// Four-component version string sent at login, echoed on version checks.
    ver1: Vec<u8>,
    /// Three-component version string the client shows in its menu corner.
    ver2: Vec<u8>,
    props: Vec<u8>,
    status: u8,
    room: Option<u32>,
}

impl Player {
    pub fn new(id: u32, name: String, ver1: Vec<u8>, ver2: Vec<u8>) -> Self {
        Self {
            id,
            name,
            ver1,
            ver2,
            props: DEFAULT_PROPS.to_vec(),
            status: status::LOBBY,
            room: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ver1(&self) -> &[u8] {
        &self.ver1
    }

    pub fn ver2(&self) -> &[u8] {
        &self.ver2
    }

    pub fn props(&self) -> &[u8] {
        &self.props
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn room(&self) -> Option<u32> {
        self.room
    }

    pub fn set_props(&mut self, props: Vec<u8>) {
        self.props = props;
    }

    pub fn set_status(&mut self, status: u8) {
        self.status = status;
    }

    pub fn enter_room(&mut self, room_key: u32, as_host: bool) {
        self.status = if as_host {
            status::ROOM_HOST
        } else {
            status::ROOM_MEMBER
        };
        self.room = Some(room_key);
    }

    pub fn leave_room(&mut self) {
        self.status = status::LOBBY;
        self.room = None;
    }
}

/// Tailors a nickname to what the client's own registration form would
/// accept: 4 to 16 characters from `a-z A-Z 0-9 ( ) + - _ . [ ]`. Short
/// names are padded with underscores, long ones truncated, anything else
/// substituted.
pub fn normalize_name(raw: &[u8]) -> String {
    let mut name = raw.to_vec();
    if name.len() < 4 {
        name.resize(4, b'_');
    } else if name.len() > 16 {
        name.truncate(16);
    }
    name.iter()
        .map(|&b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => b as char,
            b'(' | b')' | b'+' | b'-' | b'_' | b'.' | b'[' | b']' => b as char,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_pad_with_underscores() {
        assert_eq!(normalize_name(b"ab"), "ab__");
        assert_eq!(normalize_name(b""), "____");
    }

    #[test]
    fn long_names_truncate_to_sixteen() {
        assert_eq!(normalize_name(b"abcdefghijklmnopqrst"), "abcdefghijklmnop");
    }

    #[test]
    fn illegal_characters_substitute() {
        assert_eq!(normalize_name(b"a b!"), "a_b_");
        assert_eq!(normalize_name(b" !"), "____");
        assert_eq!(normalize_name(&[0xc0, 0xc1, b'o', b'k']), "__ok");
    }

    #[test]
    fn allowed_specials_survive() {
        assert_eq!(normalize_name(b"[A](b)+c-d.e_"), "[A](b)+c-d.e_");
    }

    #[test]
    fn room_link_drives_status() {
        let mut p = Player::new(3, "abcd".into(), b"1.0.0.7".to_vec(), b"2.0.7".to_vec());
        assert_eq!(p.status(), status::LOBBY);
        assert_eq!(p.room(), None);

        p.enter_room(1, false);
        assert_eq!(p.status(), status::ROOM_MEMBER);
        assert_eq!(p.room(), Some(1));

        p.leave_room();
        assert_eq!(p.status(), status::LOBBY);
        assert_eq!(p.room(), None);

        p.enter_room(3, true);
        assert_eq!(p.status(), status::ROOM_HOST);
    }
}
