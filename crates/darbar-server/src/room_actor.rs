use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use darbar_core::error::DomainError;
use darbar_core::game::{GamePlayer, GameState};
use darbar_core::net::messages::{
    ChatBroadcastMsg, GameStartedMsg, HostChangedMsg, PlayerJoinedMsg, PlayerLeftMsg,
    PlayerReadyUpdateMsg, RoleAssignedMsg, RoomSnapshot, RoundEndedMsg, ServerMessage,
    SipahiGuessedMsg,
};
use darbar_core::room::{Member, Room, RoomStatus, UserId};
use darbar_core::time::epoch_secs;

use crate::broadcast::{self, LobbySender, PlayerSender};
use crate::config::ServerConfig;
use crate::store::{RoomPatch, RoomStore};

pub type ReplyTo<T> = oneshot::Sender<Result<T, DomainError>>;

/// The mailbox for one room. Every mutation of a room code flows through
/// its actor, which is what serializes racing joins, leaves, and game
/// actions against the same room.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        user_id: UserId,
        display_name: String,
        conn: Option<PlayerSender>,
        reply: ReplyTo<RoomSnapshot>,
    },
    Leave {
        user_id: UserId,
        reply: Option<ReplyTo<RoomSnapshot>>,
    },
    SetReady {
        user_id: UserId,
        ready: bool,
        reply: ReplyTo<RoomSnapshot>,
    },
    StartGame {
        requester_id: UserId,
        reply: ReplyTo<RoomSnapshot>,
    },
    Chat {
        user_id: UserId,
        text: String,
        reply: ReplyTo<()>,
    },
    SipahiGuess {
        requester_id: UserId,
        suspect_id: UserId,
        reply: ReplyTo<()>,
    },
    EndRound {
        requester_id: UserId,
        reply: ReplyTo<()>,
    },
    Snapshot {
        reply: ReplyTo<RoomSnapshot>,
    },
    /// Armed when the connected set empties while `waiting`. The epoch makes
    /// a late firing from a cancelled arming harmless.
    IdleTimeout { epoch: u64 },
    /// Armed 5s after a round-end reveal; carries the round it should deal.
    AdvanceRound { round: u32 },
    /// Periodic global sweep: tear down if idle longer than `max_idle`.
    SweepIfIdle { max_idle: Duration },
}

#[derive(Clone)]
pub struct RoomHandle {
    pub tx: mpsc::Sender<RoomCommand>,
}

/// Registry map shared between the coordinator and the actors; each actor
/// removes its own entry on teardown.
pub type RoomMap = Arc<Mutex<HashMap<String, RoomHandle>>>;

pub struct RoomDeps {
    pub store: Arc<dyn RoomStore>,
    pub lobby: LobbySender,
    pub config: Arc<ServerConfig>,
    pub registry: RoomMap,
}

enum Flow {
    Continue,
    Teardown,
}

/// Spawn the actor task for a room code and return its handle.
pub fn spawn_room_actor(code: String, deps: RoomDeps) -> RoomHandle {
    let (tx, rx) = mpsc::channel(deps.config.limits.room_mailbox_size);
    let actor = RoomActor {
        code,
        store: deps.store,
        lobby: deps.lobby,
        config: deps.config,
        registry: deps.registry,
        self_tx: tx.clone(),
        room: None,
        game: None,
        connected: HashMap::new(),
        last_activity: Instant::now(),
        idle_epoch: 0,
        idle_timer: None,
        advance_timer: None,
    };
    tokio::spawn(actor.run(rx));
    RoomHandle { tx }
}

/// Live state for one active room: the cached persisted row, the connected
/// set, the nested game, and the two cancellable timers. The persisted
/// store stays authoritative; `room` is refreshed from the row returned by
/// every accepted write and can always be rebuilt by a fresh read.
struct RoomActor {
    code: String,
    store: Arc<dyn RoomStore>,
    lobby: LobbySender,
    config: Arc<ServerConfig>,
    registry: RoomMap,
    self_tx: mpsc::Sender<RoomCommand>,
    room: Option<Room>,
    game: Option<GameState>,
    connected: HashMap<UserId, PlayerSender>,
    last_activity: Instant,
    idle_epoch: u64,
    idle_timer: Option<AbortHandle>,
    advance_timer: Option<AbortHandle>,
}

impl RoomActor {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        while let Some(cmd) = rx.recv().await {
            if matches!(self.handle(cmd).await, Flow::Teardown) {
                break;
            }
        }
        self.cancel_timers();
        rx.close();
        while let Ok(cmd) = rx.try_recv() {
            reject(cmd, DomainError::RoomNotFound);
        }
        let mut map = self.registry.lock().expect("registry lock poisoned");
        if map
            .get(&self.code)
            .is_some_and(|h| h.tx.same_channel(&self.self_tx))
        {
            map.remove(&self.code);
        }
        tracing::debug!(room = %self.code, "Room actor stopped");
    }

    async fn handle(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::IdleTimeout { epoch } => self.on_idle_timeout(epoch).await,
            RoomCommand::SweepIfIdle { max_idle } => self.on_sweep(max_idle).await,
            RoomCommand::AdvanceRound { round } => {
                self.on_advance_round(round).await;
                Flow::Continue
            },
            other => {
                if let Err(e) = self.load().await {
                    let teardown = e == DomainError::RoomNotFound;
                    reject(other, e);
                    return if teardown { Flow::Teardown } else { Flow::Continue };
                }
                match other {
                    RoomCommand::Join {
                        user_id,
                        display_name,
                        conn,
                        reply,
                    } => {
                        let result = self.join(user_id, display_name, conn).await;
                        respond(reply, result);
                    },
                    RoomCommand::Leave { user_id, reply } => {
                        let result = self.leave(user_id).await;
                        if let Some(reply) = reply {
                            respond(reply, result);
                        }
                    },
                    RoomCommand::SetReady {
                        user_id,
                        ready,
                        reply,
                    } => {
                        let result = self.set_ready(user_id, ready).await;
                        respond(reply, result);
                    },
                    RoomCommand::StartGame {
                        requester_id,
                        reply,
                    } => {
                        let result = self.start_game(requester_id).await;
                        respond(reply, result);
                    },
                    RoomCommand::Chat {
                        user_id,
                        text,
                        reply,
                    } => {
                        let result = self.chat(user_id, text);
                        respond(reply, result);
                    },
                    RoomCommand::SipahiGuess {
                        requester_id,
                        suspect_id,
                        reply,
                    } => {
                        let result = self.sipahi_guess(requester_id, suspect_id).await;
                        respond(reply, result);
                    },
                    RoomCommand::EndRound {
                        requester_id,
                        reply,
                    } => {
                        let result = self.end_round(requester_id).await;
                        respond(reply, result);
                    },
                    RoomCommand::Snapshot { reply } => {
                        respond(reply, Ok(self.snapshot()));
                    },
                    RoomCommand::IdleTimeout { .. }
                    | RoomCommand::AdvanceRound { .. }
                    | RoomCommand::SweepIfIdle { .. } => {},
                }
                self.ensure_idle_timer();
                Flow::Continue
            },
        }
    }

    /// Read-through load of the persisted row, rehydrating any game blob.
    /// An inactive room reads as absent: it is gone as far as clients are
    /// concerned.
    async fn load(&mut self) -> Result<(), DomainError> {
        if self.room.is_some() {
            return Ok(());
        }
        match self.store.fetch_room(&self.code).await {
            Ok(Some(room)) => {
                if room.status == RoomStatus::Inactive {
                    return Err(DomainError::RoomNotFound);
                }
                self.game = room.game_state.as_ref().and_then(|blob| {
                    serde_json::from_value::<GameState>(blob.clone())
                        .inspect_err(|e| {
                            tracing::warn!(room = %self.code, error = %e, "Unreadable game blob");
                        })
                        .ok()
                });
                self.room = Some(room);
                Ok(())
            },
            Ok(None) => Err(DomainError::RoomNotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn snapshot(&self) -> RoomSnapshot {
        let room = self.room.as_ref().expect("room loaded");
        let game = self.game.as_ref().map(GameState::to_public);
        RoomSnapshot::build(room, self.connected.keys(), game)
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        broadcast::to_lobby(
            &self.lobby,
            &ServerMessage::GameStateUpdate(Box::new(snapshot)),
        );
    }

    // ---- commands ----

    async fn join(
        &mut self,
        user_id: UserId,
        display_name: String,
        conn: Option<PlayerSender>,
    ) -> Result<RoomSnapshot, DomainError> {
        let (status, already_member, is_full, private, host_id) = {
            let room = self.room.as_ref().expect("room loaded");
            (
                room.status,
                room.is_member(&user_id),
                room.is_full(),
                room.private,
                room.host_id.clone(),
            )
        };

        if matches!(status, RoomStatus::InProgress | RoomStatus::Finished) && !already_member {
            return Err(DomainError::GameInProgress);
        }
        if !already_member && is_full {
            return Err(DomainError::RoomFull);
        }
        if !already_member && private && host_id != user_id {
            return Err(DomainError::PrivateRoomDenied);
        }

        if !already_member {
            let member = Member {
                user_id: user_id.clone(),
                display_name: display_name.clone(),
                ready: false,
                joined_at: epoch_secs(),
            };
            let fresh = self
                .store
                .upsert_member(&self.code, member)
                .await
                .map_err(DomainError::from)?;
            self.room = Some(fresh);
        }

        if let Some(conn) = conn {
            self.connected.insert(user_id.clone(), conn);
        }
        self.touch();
        self.write_member_count().await;

        let snapshot = self.snapshot();
        if already_member {
            tracing::info!(user = %user_id, room = %self.code, "Player reconnected");
        } else {
            tracing::info!(user = %user_id, room = %self.code, "Player joined");
            broadcast::to_room(
                &self.code,
                &self.connected,
                &ServerMessage::PlayerJoined(PlayerJoinedMsg {
                    room_code: self.code.clone(),
                    user_id: user_id.clone(),
                    user_name: display_name,
                }),
            );
        }

        // Full snapshot straight to the joining connection, plus their own
        // role when a game is running.
        if let Some(sender) = self.connected.get(&user_id) {
            broadcast::unicast(
                &self.code,
                &user_id,
                sender,
                &ServerMessage::RoomState(Box::new(snapshot.clone())),
            );
            if status == RoomStatus::InProgress
                && let Some(game) = &self.game
                && let Some(role) = game.role_of(&user_id)
            {
                broadcast::unicast(
                    &self.code,
                    &user_id,
                    sender,
                    &ServerMessage::RoleAssigned(RoleAssignedMsg {
                        room_code: self.code.clone(),
                        round: game.round,
                        role,
                    }),
                );
            }
        }

        self.publish_snapshot();
        Ok(snapshot)
    }

    async fn leave(&mut self, user_id: UserId) -> Result<RoomSnapshot, DomainError> {
        self.connected.remove(&user_id);
        self.touch();
        tracing::info!(user = %user_id, room = %self.code, "Player left");

        broadcast::to_room(
            &self.code,
            &self.connected,
            &ServerMessage::PlayerLeft(PlayerLeftMsg {
                room_code: self.code.clone(),
                user_id: user_id.clone(),
            }),
        );

        let room = self.room.as_ref().expect("room loaded");
        if room.status == RoomStatus::Waiting && room.host_id == user_id {
            let next_host = room
                .members_by_join_order()
                .into_iter()
                .find(|m| m.user_id != user_id)
                .map(|m| (m.user_id.clone(), m.display_name.clone()));
            if let Some((new_host_id, new_host_name)) = next_host {
                match self
                    .store
                    .update_room(
                        &self.code,
                        RoomPatch {
                            host: Some((new_host_id.clone(), new_host_name.clone())),
                            ..RoomPatch::default()
                        },
                    )
                    .await
                {
                    Ok(fresh) => {
                        self.room = Some(fresh);
                        tracing::info!(
                            room = %self.code, new_host = %new_host_id, "Host migrated"
                        );
                        broadcast::to_room(
                            &self.code,
                            &self.connected,
                            &ServerMessage::HostChanged(HostChangedMsg {
                                room_code: self.code.clone(),
                                new_host_id,
                                new_host_name,
                            }),
                        );
                    },
                    Err(e) => {
                        tracing::error!(room = %self.code, error = %e, "Host migration write failed");
                    },
                }
            }
        }

        self.write_member_count().await;
        let snapshot = self.snapshot();
        self.publish_snapshot();
        Ok(snapshot)
    }

    async fn set_ready(
        &mut self,
        user_id: UserId,
        ready: bool,
    ) -> Result<RoomSnapshot, DomainError> {
        let room = self.room.as_ref().expect("room loaded");
        if room.status != RoomStatus::Waiting {
            return Err(DomainError::GameInProgress);
        }
        if !room.is_member(&user_id) {
            return Err(DomainError::NotMember);
        }

        let fresh = self
            .store
            .set_member_ready(&self.code, &user_id, ready)
            .await
            .map_err(DomainError::from)?;
        self.room = Some(fresh);
        self.touch();

        broadcast::to_room(
            &self.code,
            &self.connected,
            &ServerMessage::PlayerReadyUpdate(PlayerReadyUpdateMsg {
                room_code: self.code.clone(),
                user_id,
                is_ready: ready,
            }),
        );
        let snapshot = self.snapshot();
        self.publish_snapshot();
        Ok(snapshot)
    }

    async fn start_game(&mut self, requester_id: UserId) -> Result<RoomSnapshot, DomainError> {
        let room = self.room.as_ref().expect("room loaded");
        if room.status != RoomStatus::Waiting {
            return Err(DomainError::GameInProgress);
        }
        if room.host_id != requester_id {
            return Err(DomainError::NotHost);
        }
        let seats = room.members_by_join_order();
        if seats.len() != darbar_core::room::ROOM_CAPACITY {
            return Err(DomainError::WrongPlayerCount {
                expected: darbar_core::room::ROOM_CAPACITY,
                actual: seats.len(),
            });
        }
        if !seats.iter().all(|m| m.ready) {
            return Err(DomainError::PlayersNotReady);
        }

        let players: Vec<GamePlayer> = seats
            .into_iter()
            .map(|m| GamePlayer {
                user_id: m.user_id.clone(),
                display_name: m.display_name.clone(),
            })
            .collect();
        let game = {
            let mut rng = rand::rng();
            GameState::new(players, &mut rng)
        };
        let blob =
            serde_json::to_value(&game).map_err(|e| DomainError::Storage(e.to_string()))?;
        let fresh = self
            .store
            .update_room(
                &self.code,
                RoomPatch {
                    status: Some(RoomStatus::InProgress),
                    game_state: Some(blob),
                    ..RoomPatch::default()
                },
            )
            .await
            .map_err(DomainError::from)?;
        self.room = Some(fresh);
        self.game = Some(game);
        self.touch();
        tracing::info!(room = %self.code, host = %requester_id, "Game started");

        broadcast::to_room(
            &self.code,
            &self.connected,
            &ServerMessage::GameStarted(GameStartedMsg {
                room_code: self.code.clone(),
                round: 1,
            }),
        );
        self.deal_roles();
        let snapshot = self.snapshot();
        self.publish_snapshot();
        Ok(snapshot)
    }

    /// Unicast each connected player their own role. Role assignments never
    /// go through a room scope.
    fn deal_roles(&self) {
        let Some(game) = &self.game else { return };
        for player in game.players() {
            if let Some(sender) = self.connected.get(&player.user_id)
                && let Some(role) = game.role_of(&player.user_id)
            {
                broadcast::unicast(
                    &self.code,
                    &player.user_id,
                    sender,
                    &ServerMessage::RoleAssigned(RoleAssignedMsg {
                        room_code: self.code.clone(),
                        round: game.round,
                        role,
                    }),
                );
            }
        }
    }

    fn chat(&mut self, user_id: UserId, text: String) -> Result<(), DomainError> {
        let room = self.room.as_ref().expect("room loaded");
        let Some(member) = room.member(&user_id) else {
            return Err(DomainError::NotMember);
        };
        let user_name = member.display_name.clone();
        let Some(game) = self.game.as_mut() else {
            return Err(DomainError::GameNotActive);
        };
        game.chat(&user_id, &user_name, text.clone());
        self.touch();

        broadcast::to_room(
            &self.code,
            &self.connected,
            &ServerMessage::ChatMessage(ChatBroadcastMsg {
                room_code: self.code.clone(),
                user_id,
                user_name,
                text,
                at: epoch_secs(),
            }),
        );
        Ok(())
    }

    async fn sipahi_guess(
        &mut self,
        requester_id: UserId,
        suspect_id: UserId,
    ) -> Result<(), DomainError> {
        let Some(game) = self.game.as_mut() else {
            return Err(DomainError::GameNotActive);
        };
        let backup = game.clone();
        game.sipahi_guess(&requester_id, &suspect_id)?;
        if let Err(e) = self.persist_game().await {
            // No partial apply: a failed write rolls the engine back.
            self.game = Some(backup);
            return Err(e);
        }
        self.touch();

        broadcast::to_room(
            &self.code,
            &self.connected,
            &ServerMessage::SipahiGuessed(SipahiGuessedMsg {
                room_code: self.code.clone(),
                sipahi_id: requester_id,
                suspect_id,
            }),
        );
        self.publish_snapshot();
        Ok(())
    }

    async fn end_round(&mut self, requester_id: UserId) -> Result<(), DomainError> {
        let host_id = self.room.as_ref().expect("room loaded").host_id.clone();
        let Some(game) = self.game.as_mut() else {
            return Err(DomainError::GameNotActive);
        };
        let backup = game.clone();
        let outcome = game.end_round(&requester_id, &host_id)?;
        if let Err(e) = self.persist_game().await {
            self.game = Some(backup);
            return Err(e);
        }
        self.touch();
        tracing::info!(
            room = %self.code,
            round = outcome.round,
            caught = outcome.guess_correct,
            "Round ended"
        );

        broadcast::to_room(
            &self.code,
            &self.connected,
            &ServerMessage::RoundEnded(RoundEndedMsg {
                room_code: self.code.clone(),
                round: outcome.round,
                roles: outcome.roles,
                guess: outcome.guess,
                guess_correct: outcome.guess_correct,
                scores: outcome.scores,
            }),
        );
        self.publish_snapshot();
        self.arm_advance_timer(outcome.round + 1);
        Ok(())
    }

    /// Auto-advance after the reveal delay. The premise is re-checked here:
    /// a stale firing (round already moved on, room torn down, game over)
    /// is a logged no-op.
    async fn on_advance_round(&mut self, round: u32) {
        self.advance_timer = None;
        let premise_holds = self.room.as_ref().is_some_and(|r| {
            r.status == RoomStatus::InProgress
        }) && self.game.as_ref().is_some_and(|g| {
            g.phase == darbar_core::game::GamePhase::RoundEnd && g.round + 1 == round
        });
        if !premise_holds {
            tracing::debug!(room = %self.code, round, "Stale round auto-advance ignored");
            return;
        }

        // Round boundary rule: the game only continues with the same four
        // seated, connected players. Otherwise it freezes as finished.
        let room = self.room.as_ref().expect("premise checked");
        let game = self.game.as_ref().expect("premise checked");
        let table_intact = game
            .players()
            .iter()
            .all(|p| room.is_member(&p.user_id) && self.connected.contains_key(&p.user_id));

        if !table_intact {
            let game = self.game.as_mut().expect("premise checked");
            game.push_system("Game over: the table broke up".to_string());
            let blob = match serde_json::to_value(&*game) {
                Ok(blob) => blob,
                Err(e) => {
                    tracing::error!(room = %self.code, error = %e, "Failed to encode game blob");
                    return;
                },
            };
            match self
                .store
                .update_room(
                    &self.code,
                    RoomPatch {
                        status: Some(RoomStatus::Finished),
                        game_state: Some(blob),
                        ..RoomPatch::default()
                    },
                )
                .await
            {
                Ok(fresh) => {
                    self.room = Some(fresh);
                    tracing::info!(room = %self.code, "Game finished at round boundary");
                    self.publish_snapshot();
                },
                Err(e) => {
                    // Timer context: log and move on, the sweep will retry.
                    tracing::error!(room = %self.code, error = %e, "Failed to finish game");
                },
            }
            return;
        }

        let backup = self.game.clone();
        {
            let game = self.game.as_mut().expect("premise checked");
            let mut rng = rand::rng();
            game.begin_round(round, &mut rng);
        }
        if let Err(e) = self.persist_game().await {
            tracing::error!(room = %self.code, error = %e, "Failed to persist next round");
            self.game = backup;
            return;
        }
        self.touch();
        tracing::info!(room = %self.code, round, "Next round dealt");
        self.deal_roles();
        self.publish_snapshot();
    }

    async fn on_idle_timeout(&mut self, epoch: u64) -> Flow {
        self.idle_timer = None;
        if epoch != self.idle_epoch {
            tracing::debug!(room = %self.code, "Stale idle timeout ignored");
            return Flow::Continue;
        }
        let premise_holds = self
            .room
            .as_ref()
            .is_some_and(|r| r.status == RoomStatus::Waiting)
            && self.connected.is_empty();
        if !premise_holds {
            tracing::debug!(room = %self.code, "Idle timeout premise gone, ignored");
            return Flow::Continue;
        }

        match self
            .store
            .update_room(
                &self.code,
                RoomPatch {
                    status: Some(RoomStatus::Inactive),
                    ..RoomPatch::default()
                },
            )
            .await
        {
            Ok(fresh) => {
                self.room = Some(fresh);
                tracing::info!(room = %self.code, "Empty room went inactive");
                self.publish_snapshot();
                Flow::Teardown
            },
            Err(e) => {
                // Timer context: swallow and retry from the next sweep.
                tracing::error!(room = %self.code, error = %e, "Failed to deactivate room");
                Flow::Continue
            },
        }
    }

    async fn on_sweep(&mut self, max_idle: Duration) -> Flow {
        if self.last_activity.elapsed() < max_idle {
            return Flow::Continue;
        }
        let still_waiting = self
            .room
            .as_ref()
            .is_some_and(|r| r.status == RoomStatus::Waiting);
        if still_waiting {
            let result = self
                .store
                .update_room(
                    &self.code,
                    RoomPatch {
                        status: Some(RoomStatus::Inactive),
                        ..RoomPatch::default()
                    },
                )
                .await;
            if let Err(e) = result {
                tracing::error!(room = %self.code, error = %e, "Sweep failed to deactivate room");
            }
        }
        tracing::info!(room = %self.code, "Idle room swept");
        Flow::Teardown
    }

    // ---- plumbing ----

    async fn persist_game(&mut self) -> Result<(), DomainError> {
        let game = self.game.as_ref().expect("game active");
        let blob = serde_json::to_value(game).map_err(|e| DomainError::Storage(e.to_string()))?;
        let fresh = self
            .store
            .update_room(
                &self.code,
                RoomPatch {
                    game_state: Some(blob),
                    ..RoomPatch::default()
                },
            )
            .await
            .map_err(DomainError::from)?;
        self.room = Some(fresh);
        Ok(())
    }

    /// Write-through of the connected-and-seated count. Cosmetic for lobby
    /// listings, so a failure is logged rather than surfaced.
    async fn write_member_count(&mut self) {
        let Some(room) = &self.room else { return };
        let count = room
            .members
            .iter()
            .filter(|m| self.connected.contains_key(&m.user_id))
            .count() as u32;
        if room.member_count == count {
            return;
        }
        match self
            .store
            .update_room(
                &self.code,
                RoomPatch {
                    member_count: Some(count),
                    ..RoomPatch::default()
                },
            )
            .await
        {
            Ok(fresh) => self.room = Some(fresh),
            Err(e) => {
                tracing::warn!(room = %self.code, error = %e, "Failed to write member count");
            },
        }
    }

    /// Keep the empty-room eviction timer consistent with its premise:
    /// armed iff the room is `waiting` with nobody connected.
    fn ensure_idle_timer(&mut self) {
        let should_arm = self
            .room
            .as_ref()
            .is_some_and(|r| r.status == RoomStatus::Waiting)
            && self.connected.is_empty();
        match (should_arm, self.idle_timer.is_some()) {
            (true, false) => self.arm_idle_timer(),
            (false, true) => self.cancel_idle_timer(),
            _ => {},
        }
    }

    fn arm_idle_timer(&mut self) {
        self.idle_epoch += 1;
        let epoch = self.idle_epoch;
        let tx = self.self_tx.clone();
        let delay = Duration::from_millis(self.config.rooms.empty_room_timeout_ms);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RoomCommand::IdleTimeout { epoch }).await;
        });
        self.idle_timer = Some(task.abort_handle());
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }

    fn arm_advance_timer(&mut self, round: u32) {
        if let Some(timer) = self.advance_timer.take() {
            timer.abort();
        }
        let tx = self.self_tx.clone();
        let delay = Duration::from_millis(self.config.rooms.round_advance_delay_ms);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RoomCommand::AdvanceRound { round }).await;
        });
        self.advance_timer = Some(task.abort_handle());
    }

    fn cancel_timers(&mut self) {
        self.cancel_idle_timer();
        if let Some(timer) = self.advance_timer.take() {
            timer.abort();
        }
    }
}

fn respond<T>(reply: ReplyTo<T>, result: Result<T, DomainError>) {
    if reply.send(result).is_err() {
        tracing::debug!("Caller went away before the room replied");
    }
}

/// Reply to whatever a command carries with the given error. Timer commands
/// have no caller to tell.
fn reject(cmd: RoomCommand, err: DomainError) {
    match cmd {
        RoomCommand::Join { reply, .. } => respond(reply, Err(err)),
        RoomCommand::Leave { reply: Some(reply), .. } => respond(reply, Err(err)),
        RoomCommand::SetReady { reply, .. } => respond(reply, Err(err)),
        RoomCommand::StartGame { reply, .. } => respond(reply, Err(err)),
        RoomCommand::Chat { reply, .. } => respond(reply, Err(err)),
        RoomCommand::SipahiGuess { reply, .. } => respond(reply, Err(err)),
        RoomCommand::EndRound { reply, .. } => respond(reply, Err(err)),
        RoomCommand::Snapshot { reply } => respond(reply, Err(err)),
        RoomCommand::Leave { reply: None, .. }
        | RoomCommand::IdleTimeout { .. }
        | RoomCommand::AdvanceRound { .. }
        | RoomCommand::SweepIfIdle { .. } => {},
    }
}
