use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable player identity supplied by the auth layer.
pub type UserId = String;

/// Seats in a startable room. The four-role game is fixed at four players.
pub const ROOM_CAPACITY: usize = 4;

/// Room code alphabet. Skips 0/O and 1/I so codes survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
    Inactive,
}

/// A player's persisted seat in a room. Independent of live connection
/// state: a member stays seated across disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    pub ready: bool,
    pub joined_at: u64,
}

/// The persisted room row, with its member list in join order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub image: Option<String>,
    pub private: bool,
    pub status: RoomStatus,
    pub host_id: UserId,
    pub host_name: String,
    /// Live connected-and-seated count, written through on connect/disconnect.
    pub member_count: u32,
    pub created_at: u64,
    pub members: Vec<Member>,
    /// Opaque game blob, written on every phase transition. Retained after
    /// the game finishes.
    pub game_state: Option<serde_json::Value>,
}

impl Room {
    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.member(user_id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= ROOM_CAPACITY
    }

    /// Members ordered by join time. Host migration and seat order at game
    /// start both key off this ordering.
    pub fn members_by_join_order(&self) -> Vec<&Member> {
        let mut ordered: Vec<&Member> = self.members.iter().collect();
        ordered.sort_by_key(|m| m.joined_at);
        ordered
    }
}

/// Generate a shareable room code.
pub fn generate_room_code() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Validate the shape of a client-supplied room code.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_room;

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert!(is_valid_room_code(&code), "invalid room code: {code}");
        }
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(!is_valid_room_code(""));
        assert!(!is_valid_room_code("ABC"));
        assert!(!is_valid_room_code("ABCDEFG"));
        assert!(!is_valid_room_code("ABC10Z")); // 0 and 1 are not in the alphabet
        assert!(!is_valid_room_code("abcdef")); // lowercase
    }

    #[test]
    fn status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&RoomStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(
            serde_json::from_str::<RoomStatus>("\"waiting\"").unwrap(),
            RoomStatus::Waiting
        );
    }

    #[test]
    fn join_order_follows_timestamps() {
        let mut room = make_room("ABCDEF", 3);
        // Scramble the stored order; join order must still come from joined_at.
        room.members.reverse();
        let ordered = room.members_by_join_order();
        assert_eq!(ordered[0].user_id, "u1");
        assert_eq!(ordered[2].user_id, "u3");
    }

    #[test]
    fn full_room_detection() {
        let room = make_room("ABCDEF", ROOM_CAPACITY);
        assert!(room.is_full());
        assert!(room.is_member("u4"));
        assert!(!room.is_member("u5"));
    }
}
