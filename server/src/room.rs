//! A joinable game slot, keyed by its host's client id.

/// Room state shown to lobby newcomers and replayed on host migration.
///
/// The member list keeps join order: the creating host sits at index 0 and
/// later joiners append. Host migration promotes the last entry.
pub struct Room {
    host_id: u32,
    /// `"name"\t"password"\t[0|h]BUILD`, fixed at creation.
    description: Vec<u8>,
    /// `%d|%d|%d|%d|%d|%d` (status, humans, AIs, closed slots, two unused);
    /// whatever the host sends is stored verbatim.
    info: Vec<u8>,
    members: Vec<u32>,
    hidden: bool,
}

impl Room {
    pub fn new(host_id: u32, description: Vec<u8>) -> Self {
        Self {
            host_id,
            description,
            info: b"0".to_vec(),
            members: Vec::with_capacity(8),
            hidden: false,
        }
    }

    pub fn host_id(&self) -> u32 {
        self.host_id
    }

    pub fn description(&self) -> &[u8] {
        &self.description
    }

    pub fn info(&self) -> &[u8] {
        &self.info
    }

    pub fn members(&self) -> &[u32] {
        &self.members
    }

    pub fn set_info(&mut self, info: Vec<u8>) {
        self.info = info;
    }

    pub fn add_member(&mut self, id: u32) {
        self.members.push(id);
    }

    pub fn remove_member(&mut self, id: u32) {
        self.members.retain(|&m| m != id);
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
    }

    /// Started games stay alive for their members but drop out of the
    /// lobby listing.
    pub fn hide_from_lobby(&mut self) {
        self.hidden = true;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_keep_join_order() {
        let mut room = Room::new(1, b"\"r\"\t\"\"\t008C7".to_vec());
        room.add_member(1);
        room.add_member(2);
        room.add_member(3);
        assert_eq!(room.members(), &[1, 2, 3]);

        room.remove_member(2);
        assert_eq!(room.members(), &[1, 3]);
    }

    #[test]
    fn new_room_defaults() {
        let room = Room::new(7, b"d".to_vec());
        assert_eq!(room.host_id(), 7);
        assert_eq!(room.info(), b"0");
        assert!(!room.is_hidden());
        assert!(room.members().is_empty());
    }
}
