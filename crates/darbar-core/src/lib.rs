pub mod error;
pub mod game;
pub mod net;
pub mod room;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::room::{Member, Room, RoomStatus};
    use crate::time::epoch_secs;

    /// Create `n` seated members named Player1..PlayerN with ids u1..uN.
    pub fn make_members(n: usize) -> Vec<Member> {
        (0..n)
            .map(|i| Member {
                user_id: format!("u{}", i + 1),
                display_name: format!("Player{}", i + 1),
                ready: false,
                joined_at: epoch_secs() + i as u64,
            })
            .collect()
    }

    /// Create a waiting room with the given code, hosted by `u1`, with `n` members.
    pub fn make_room(code: &str, n: usize) -> Room {
        let members = make_members(n);
        Room {
            id: uuid::Uuid::new_v4(),
            code: code.to_string(),
            title: format!("{code} lounge"),
            image: None,
            private: false,
            status: RoomStatus::Waiting,
            host_id: "u1".to_string(),
            host_name: "Player1".to_string(),
            member_count: members.len() as u32,
            created_at: epoch_secs(),
            members,
            game_state: None,
        }
    }
}
