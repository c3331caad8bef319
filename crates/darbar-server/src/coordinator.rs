use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use darbar_core::error::DomainError;
use darbar_core::net::messages::{GameAction, RoomSnapshot};
use darbar_core::room::{Room, RoomStatus, generate_room_code, is_valid_room_code};

use crate::broadcast::{LobbySender, PlayerSender};
use crate::config::ServerConfig;
use crate::room_actor::{RoomCommand, RoomDeps, RoomHandle, RoomMap, spawn_room_actor};
use crate::sessions::SessionRegistry;
use crate::store::{NewRoom, RoomStore, StoreError};

/// The owned entry point for every room mutation. Holds the live-room
/// registry (code → actor handle) and the session table; both are created
/// with the process and handed around explicitly, never ambient.
pub struct Coordinator {
    store: Arc<dyn RoomStore>,
    pub sessions: SessionRegistry,
    rooms: RoomMap,
    lobby: LobbySender,
    config: Arc<ServerConfig>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn RoomStore>, lobby: LobbySender, config: Arc<ServerConfig>) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(),
            rooms: Arc::new(Mutex::new(HashMap::new())),
            lobby,
            config,
        }
    }

    fn handle_for(&self, code: &str) -> RoomHandle {
        let mut map = self.rooms.lock().expect("registry lock poisoned");
        if let Some(handle) = map.get(code) {
            return handle.clone();
        }
        let handle = spawn_room_actor(
            code.to_string(),
            RoomDeps {
                store: Arc::clone(&self.store),
                lobby: self.lobby.clone(),
                config: Arc::clone(&self.config),
                registry: Arc::clone(&self.rooms),
            },
        );
        map.insert(code.to_string(), handle.clone());
        handle
    }

    /// Deliver a command to the room's actor, respawning it once if it tore
    /// itself down between lookup and send.
    async fn dispatch(&self, code: &str, cmd: RoomCommand) -> Result<(), DomainError> {
        let handle = self.handle_for(code);
        match handle.tx.send(cmd).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(cmd)) => {
                {
                    let mut map = self.rooms.lock().expect("registry lock poisoned");
                    if map
                        .get(code)
                        .is_some_and(|h| h.tx.same_channel(&handle.tx))
                    {
                        map.remove(code);
                    }
                }
                let retry = self.handle_for(code);
                retry
                    .tx
                    .send(cmd)
                    .await
                    .map_err(|_| DomainError::Storage("room mailbox closed".to_string()))
            },
        }
    }

    async fn request<T>(
        &self,
        code: &str,
        make: impl FnOnce(oneshot::Sender<Result<T, DomainError>>) -> RoomCommand,
    ) -> Result<T, DomainError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(code, make(tx)).await?;
        rx.await.map_err(|_| DomainError::RoomNotFound)?
    }

    /// Create a room and seat the requesting player as its host.
    pub async fn create_room(
        &self,
        title: String,
        image: Option<String>,
        private: bool,
        host_id: &str,
        host_name: &str,
    ) -> Result<RoomSnapshot, DomainError> {
        self.sessions.resolve(host_id, host_name);
        // Retry a handful of times if the generated code collides.
        for _ in 0..4 {
            let code = generate_room_code();
            match self
                .store
                .create_room(NewRoom {
                    code: code.clone(),
                    title: title.clone(),
                    image: image.clone(),
                    private,
                    host_id: host_id.to_string(),
                    host_name: host_name.to_string(),
                })
                .await
            {
                Ok(_) => {
                    tracing::info!(room = %code, host = %host_id, "Room created");
                    return self.join_room(&code, host_id, host_name, None).await;
                },
                Err(StoreError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::Storage(
            "could not allocate a unique room code".to_string(),
        ))
    }

    /// Join (or reconnect to) a room. Enforces the at-most-one-room
    /// invariant by force-leaving any other room the user is joined to
    /// before the target room's actor sees the join.
    pub async fn join_room(
        &self,
        code: &str,
        user_id: &str,
        user_name: &str,
        conn: Option<PlayerSender>,
    ) -> Result<RoomSnapshot, DomainError> {
        if !is_valid_room_code(code) {
            return Err(DomainError::RoomNotFound);
        }
        self.sessions.resolve(user_id, user_name);
        for other in self.sessions.rooms_joined(user_id) {
            if other != code {
                if let Err(e) = self.leave_room(&other, user_id).await {
                    tracing::debug!(user = %user_id, room = %other, error = %e, "Force-leave failed");
                }
            }
        }

        let user = user_id.to_string();
        let name = user_name.to_string();
        let snapshot = self
            .request(code, move |reply| RoomCommand::Join {
                user_id: user,
                display_name: name,
                conn,
                reply,
            })
            .await?;
        self.sessions.note_join(user_id, code);
        Ok(snapshot)
    }

    /// Disconnect a player from a room's live session. The seat persists.
    pub async fn leave_room(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<RoomSnapshot, DomainError> {
        let user = user_id.to_string();
        let snapshot = self
            .request(code, move |reply| RoomCommand::Leave {
                user_id: user,
                reply: Some(reply),
            })
            .await?;
        self.sessions.note_leave(user_id, code);
        Ok(snapshot)
    }

    pub async fn set_ready(
        &self,
        code: &str,
        user_id: &str,
        ready: bool,
    ) -> Result<RoomSnapshot, DomainError> {
        let user = user_id.to_string();
        self.request(code, move |reply| RoomCommand::SetReady {
            user_id: user,
            ready,
            reply,
        })
        .await
    }

    pub async fn start_game(
        &self,
        code: &str,
        requester_id: &str,
    ) -> Result<RoomSnapshot, DomainError> {
        let requester = requester_id.to_string();
        self.request(code, move |reply| RoomCommand::StartGame {
            requester_id: requester,
            reply,
        })
        .await
    }

    pub async fn game_action(
        &self,
        code: &str,
        user_id: &str,
        action: GameAction,
    ) -> Result<(), DomainError> {
        let user = user_id.to_string();
        match action {
            GameAction::ChatMessage { text } => {
                self.request(code, move |reply| RoomCommand::Chat {
                    user_id: user,
                    text,
                    reply,
                })
                .await
            },
            GameAction::SipahiGuess { suspect_id } => {
                self.request(code, move |reply| RoomCommand::SipahiGuess {
                    requester_id: user,
                    suspect_id,
                    reply,
                })
                .await
            },
            GameAction::EndRound => {
                self.request(code, move |reply| RoomCommand::EndRound {
                    requester_id: user,
                    reply,
                })
                .await
            },
        }
    }

    pub async fn room_snapshot(&self, code: &str) -> Result<RoomSnapshot, DomainError> {
        self.request(code, |reply| RoomCommand::Snapshot { reply }).await
    }

    /// Gateway disconnect path: stamp the session and drop the live seat.
    pub async fn disconnect(&self, user_id: &str, room_code: Option<&str>) {
        self.sessions.record_disconnect(user_id);
        if let Some(code) = room_code
            && let Err(e) = self.leave_room(code, user_id).await
        {
            tracing::debug!(user = %user_id, room = %code, error = %e, "Disconnect cleanup failed");
        }
    }

    /// Periodic maintenance: nudge every live room to check its idle age and
    /// purge long-disconnected sessions. Store failures inside the sweep are
    /// logged by the actors, never propagated.
    pub async fn sweep(&self) {
        let max_idle = Duration::from_secs(self.config.rooms.idle_room_timeout_secs);
        let handles: Vec<RoomHandle> = {
            let map = self.rooms.lock().expect("registry lock poisoned");
            map.values().cloned().collect()
        };
        for handle in handles {
            let _ = handle.tx.send(RoomCommand::SweepIfIdle { max_idle }).await;
        }
        let purged = self.sessions.purge_idle(self.config.sessions.purge_after_secs);
        if purged > 0 {
            tracing::info!(purged, "Purged idle sessions");
        }
    }

    /// Persisted rooms visible to lobby browsers. Inactive rooms are gone.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, DomainError> {
        let rooms = self.store.list_rooms().await.map_err(DomainError::from)?;
        Ok(rooms
            .into_iter()
            .filter(|r| r.status != RoomStatus::Inactive)
            .collect())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.lock().expect("registry lock poisoned").len()
    }
}
