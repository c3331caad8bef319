use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use darbar_core::error::DomainError;
use darbar_core::room::{Member, Room, RoomStatus, UserId};
use darbar_core::time::epoch_secs;

/// Persistence failures, surfaced to callers as retryable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room not found")]
    NotFound,
    #[error("room code already taken")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => DomainError::RoomNotFound,
            other => DomainError::Storage(other.to_string()),
        }
    }
}

/// Fields for a new room row.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub code: String,
    pub title: String,
    pub image: Option<String>,
    pub private: bool,
    pub host_id: UserId,
    pub host_name: String,
}

/// A single atomic room update. Only the set fields change.
#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub host: Option<(UserId, String)>,
    pub game_state: Option<serde_json::Value>,
    pub member_count: Option<u32>,
}

/// The coordinator's only window onto the persistence engine.
///
/// Every mutation is atomic per call and returns the canonical row as
/// written, so the in-memory cache is always refreshed from a full read
/// rather than patched field by field. `upsert_member` is the single
/// authoritative seat write: it detaches the user from any other room in
/// the same call, which is what keeps a user id in at most one member list
/// even under concurrent joins.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn fetch_room(&self, code: &str) -> Result<Option<Room>, StoreError>;
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;
    async fn create_room(&self, new: NewRoom) -> Result<Room, StoreError>;
    async fn update_room(&self, code: &str, patch: RoomPatch) -> Result<Room, StoreError>;
    async fn upsert_member(&self, code: &str, member: Member) -> Result<Room, StoreError>;
    async fn set_member_ready(
        &self,
        code: &str,
        user_id: &str,
        ready: bool,
    ) -> Result<Room, StoreError>;
}

/// In-process store used by the default deployment and by tests. The trait
/// is the durability boundary; swapping in a networked implementation does
/// not touch the coordinator.
#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<String, Room>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn fetch_room(&self, code: &str) -> Result<Option<Room>, StoreError> {
        let rooms = self.rooms.lock().expect("store lock poisoned");
        Ok(rooms.get(code).cloned())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let rooms = self.rooms.lock().expect("store lock poisoned");
        let mut all: Vec<Room> = rooms.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    async fn create_room(&self, new: NewRoom) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().expect("store lock poisoned");
        if rooms.contains_key(&new.code) {
            return Err(StoreError::Conflict);
        }
        let room = Room {
            id: Uuid::new_v4(),
            code: new.code.clone(),
            title: new.title,
            image: new.image,
            private: new.private,
            status: RoomStatus::Waiting,
            host_id: new.host_id,
            host_name: new.host_name,
            member_count: 0,
            created_at: epoch_secs(),
            members: Vec::new(),
            game_state: None,
        };
        rooms.insert(new.code, room.clone());
        Ok(room)
    }

    async fn update_room(&self, code: &str, patch: RoomPatch) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().expect("store lock poisoned");
        let room = rooms.get_mut(code).ok_or(StoreError::NotFound)?;
        if let Some(status) = patch.status {
            room.status = status;
        }
        if let Some((host_id, host_name)) = patch.host {
            room.host_id = host_id;
            room.host_name = host_name;
        }
        if let Some(blob) = patch.game_state {
            room.game_state = Some(blob);
        }
        if let Some(count) = patch.member_count {
            room.member_count = count;
        }
        Ok(room.clone())
    }

    async fn upsert_member(&self, code: &str, member: Member) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().expect("store lock poisoned");
        if !rooms.contains_key(code) {
            return Err(StoreError::NotFound);
        }
        // Detach the seat everywhere else first: one seat per user id.
        for (other_code, other) in rooms.iter_mut() {
            if other_code != code {
                other.members.retain(|m| m.user_id != member.user_id);
            }
        }
        let room = rooms.get_mut(code).expect("checked above");
        match room.members.iter_mut().find(|m| m.user_id == member.user_id) {
            Some(existing) => *existing = member,
            None => room.members.push(member),
        }
        Ok(room.clone())
    }

    async fn set_member_ready(
        &self,
        code: &str,
        user_id: &str,
        ready: bool,
    ) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().expect("store lock poisoned");
        let room = rooms.get_mut(code).ok_or(StoreError::NotFound)?;
        let member = room
            .members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or(StoreError::NotFound)?;
        member.ready = ready;
        Ok(room.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_room(code: &str) -> NewRoom {
        NewRoom {
            code: code.to_string(),
            title: "test room".to_string(),
            image: None,
            private: false,
            host_id: "host".to_string(),
            host_name: "Host".to_string(),
        }
    }

    fn member(user_id: &str, joined_at: u64) -> Member {
        Member {
            user_id: user_id.to_string(),
            display_name: user_id.to_uppercase(),
            ready: false,
            joined_at,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let store = MemoryStore::new();
        store.create_room(new_room("AAAAAA")).await.unwrap();
        let room = store.fetch_room("AAAAAA").await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(room.members.is_empty());
        assert!(store.fetch_room("BBBBBB").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_code_conflicts() {
        let store = MemoryStore::new();
        store.create_room(new_room("AAAAAA")).await.unwrap();
        assert!(matches!(
            store.create_room(new_room("AAAAAA")).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn upsert_detaches_seat_from_other_rooms() {
        let store = MemoryStore::new();
        store.create_room(new_room("AAAAAA")).await.unwrap();
        store.create_room(new_room("BBBBBB")).await.unwrap();

        store.upsert_member("AAAAAA", member("u1", 1)).await.unwrap();
        let room_b = store.upsert_member("BBBBBB", member("u1", 2)).await.unwrap();
        assert!(room_b.is_member("u1"));

        let room_a = store.fetch_room("AAAAAA").await.unwrap().unwrap();
        assert!(!room_a.is_member("u1"), "u1 should hold only one seat");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_seat() {
        let store = MemoryStore::new();
        store.create_room(new_room("AAAAAA")).await.unwrap();
        store.upsert_member("AAAAAA", member("u1", 1)).await.unwrap();
        let room = store.upsert_member("AAAAAA", member("u1", 9)).await.unwrap();
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.members[0].joined_at, 9);
    }

    #[tokio::test]
    async fn update_room_patches_only_set_fields() {
        let store = MemoryStore::new();
        store.create_room(new_room("AAAAAA")).await.unwrap();
        let room = store
            .update_room(
                "AAAAAA",
                RoomPatch {
                    status: Some(RoomStatus::InProgress),
                    ..RoomPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(room.status, RoomStatus::InProgress);
        assert_eq!(room.host_id, "host");
        assert_eq!(room.member_count, 0);
    }

    #[tokio::test]
    async fn ready_flag_persists() {
        let store = MemoryStore::new();
        store.create_room(new_room("AAAAAA")).await.unwrap();
        store.upsert_member("AAAAAA", member("u1", 1)).await.unwrap();
        let room = store.set_member_ready("AAAAAA", "u1", true).await.unwrap();
        assert!(room.member("u1").unwrap().ready);
        assert!(matches!(
            store.set_member_ready("AAAAAA", "ghost", true).await,
            Err(StoreError::NotFound)
        ));
    }
}
