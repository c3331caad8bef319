use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use darbar_core::room::UserId;
use darbar_core::time::epoch_secs;

/// Ephemeral per-identity record. Created on first contact, updated on every
/// room join/leave, deleted only by the idle purge.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub display_name: String,
    pub connected_at: u64,
    /// Room codes this identity currently counts as joined to.
    pub rooms: HashSet<String>,
    /// Stamped on disconnect, left in place until the next connect.
    pub disconnected_at: Option<u64>,
}

/// Owned session table. Mutations never hold the lock across an await.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<UserId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the session for an identity. Idempotent; a repeat call
    /// refreshes the display name and clears the disconnect stamp.
    pub fn resolve(&self, user_id: &str, display_name: &str) -> Session {
        let mut sessions = self.inner.lock().expect("session lock poisoned");
        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                connected_at: epoch_secs(),
                rooms: HashSet::new(),
                disconnected_at: None,
            });
        session.display_name = display_name.to_string();
        session.disconnected_at = None;
        session.clone()
    }

    /// Stamp the disconnect time. The record survives so a reconnecting
    /// player can be matched back to their seat.
    pub fn record_disconnect(&self, user_id: &str) {
        let mut sessions = self.inner.lock().expect("session lock poisoned");
        if let Some(session) = sessions.get_mut(user_id) {
            session.disconnected_at = Some(epoch_secs());
        }
    }

    pub fn note_join(&self, user_id: &str, room_code: &str) {
        let mut sessions = self.inner.lock().expect("session lock poisoned");
        if let Some(session) = sessions.get_mut(user_id) {
            session.rooms.insert(room_code.to_string());
        }
    }

    pub fn note_leave(&self, user_id: &str, room_code: &str) {
        let mut sessions = self.inner.lock().expect("session lock poisoned");
        if let Some(session) = sessions.get_mut(user_id) {
            session.rooms.remove(room_code);
        }
    }

    /// Rooms this identity is currently joined to.
    pub fn rooms_joined(&self, user_id: &str) -> Vec<String> {
        let sessions = self.inner.lock().expect("session lock poisoned");
        sessions
            .get(user_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Delete sessions disconnected for longer than `max_idle_secs`.
    /// Returns the number removed.
    pub fn purge_idle(&self, max_idle_secs: u64) -> usize {
        let now = epoch_secs();
        let mut sessions = self.inner.lock().expect("session lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| match s.disconnected_at {
            Some(at) => now.saturating_sub(at) < max_idle_secs,
            None => true,
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_idempotent() {
        let registry = SessionRegistry::new();
        let first = registry.resolve("u1", "Alice");
        let second = registry.resolve("u1", "Alice");
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reconnect_clears_disconnect_stamp() {
        let registry = SessionRegistry::new();
        registry.resolve("u1", "Alice");
        registry.record_disconnect("u1");
        let session = registry.resolve("u1", "Alice");
        assert!(session.disconnected_at.is_none());
    }

    #[test]
    fn join_leave_bookkeeping() {
        let registry = SessionRegistry::new();
        registry.resolve("u1", "Alice");
        registry.note_join("u1", "AAAAAA");
        assert_eq!(registry.rooms_joined("u1"), vec!["AAAAAA".to_string()]);
        registry.note_leave("u1", "AAAAAA");
        assert!(registry.rooms_joined("u1").is_empty());
    }

    #[test]
    fn purge_removes_only_long_disconnected() {
        let registry = SessionRegistry::new();
        registry.resolve("gone", "Gone");
        registry.resolve("here", "Here");
        registry.record_disconnect("gone");
        {
            let mut sessions = registry.inner.lock().unwrap();
            sessions.get_mut("gone").unwrap().disconnected_at = Some(epoch_secs() - 10_000);
        }
        let removed = registry.purge_idle(7_200);
        assert_eq!(removed, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.rooms_joined("here").is_empty());
    }
}
