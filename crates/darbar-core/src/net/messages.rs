use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::{PublicGameState, Role};
use crate::room::{Member, Room, RoomStatus, UserId};

/// Network message type discriminator, the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Coordinator
    JoinRoom = 0x01,
    LeaveRoom = 0x02,
    PlayerReady = 0x03,
    StartGame = 0x04,
    GameAction = 0x05,

    // Coordinator -> Client
    Ack = 0x10,
    RoomState = 0x11,
    GameStateUpdate = 0x12,
    PlayerJoined = 0x13,
    PlayerLeft = 0x14,
    PlayerReadyUpdate = 0x15,
    HostChanged = 0x16,
    GameStarted = 0x17,
    RoleAssigned = 0x18,
    SipahiGuessed = 0x19,
    RoundEnded = 0x1A,
    ChatMessage = 0x1B,
    Error = 0x1F,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::JoinRoom,
            0x02 => Self::LeaveRoom,
            0x03 => Self::PlayerReady,
            0x04 => Self::StartGame,
            0x05 => Self::GameAction,
            0x10 => Self::Ack,
            0x11 => Self::RoomState,
            0x12 => Self::GameStateUpdate,
            0x13 => Self::PlayerJoined,
            0x14 => Self::PlayerLeft,
            0x15 => Self::PlayerReadyUpdate,
            0x16 => Self::HostChanged,
            0x17 => Self::GameStarted,
            0x18 => Self::RoleAssigned,
            0x19 => Self::SipahiGuessed,
            0x1A => Self::RoundEnded,
            0x1B => Self::ChatMessage,
            0x1F => Self::Error,
            _ => return None,
        })
    }
}

// ---- Client payloads ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoomMsg {
    pub room_code: String,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRoomMsg {
    pub room_code: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerReadyMsg {
    pub room_code: String,
    pub user_id: UserId,
    pub is_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGameMsg {
    pub room_code: String,
}

/// In-game actions, multiplexed under one message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum GameAction {
    ChatMessage { text: String },
    SipahiGuess { suspect_id: UserId },
    EndRound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameActionMsg {
    pub room_code: String,
    pub action: GameAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    JoinRoom(JoinRoomMsg),
    LeaveRoom(LeaveRoomMsg),
    PlayerReady(PlayerReadyMsg),
    StartGame(StartGameMsg),
    GameAction(GameActionMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::JoinRoom(_) => MessageType::JoinRoom,
            Self::LeaveRoom(_) => MessageType::LeaveRoom,
            Self::PlayerReady(_) => MessageType::PlayerReady,
            Self::StartGame(_) => MessageType::StartGame,
            Self::GameAction(_) => MessageType::GameAction,
        }
    }

    pub fn room_code(&self) -> &str {
        match self {
            Self::JoinRoom(m) => &m.room_code,
            Self::LeaveRoom(m) => &m.room_code,
            Self::PlayerReady(m) => &m.room_code,
            Self::StartGame(m) => &m.room_code,
            Self::GameAction(m) => &m.room_code,
        }
    }
}

// ---- Server payloads ----

/// Per-request acknowledgement: `{success, error?}` or `{success, room?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckMsg {
    pub success: bool,
    pub error: Option<String>,
    pub room: Option<RoomSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub current: u32,
    pub max: u32,
}

/// A member as seen in a broadcast snapshot: the persisted seat plus live
/// connection status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub ready: bool,
    pub connected: bool,
    pub joined_at: u64,
}

/// The canonical room snapshot broadcast on every accepted state change.
/// Never carries an unrevealed role map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: String,
    pub title: String,
    pub image: Option<String>,
    pub private: bool,
    pub status: RoomStatus,
    pub host_id: UserId,
    pub host_name: String,
    pub capacity: Capacity,
    pub created_at: u64,
    pub members: Vec<MemberInfo>,
    pub game: Option<PublicGameState>,
}

impl RoomSnapshot {
    /// Assemble a snapshot from the persisted row, the live connected set,
    /// and the game's public view.
    pub fn build<'a, I>(room: &Room, connected: I, game: Option<PublicGameState>) -> Self
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let connected: std::collections::HashSet<&str> =
            connected.into_iter().map(String::as_str).collect();
        let mut members: Vec<&Member> = room.members.iter().collect();
        members.sort_by_key(|m| m.joined_at);
        let members: Vec<MemberInfo> = members
            .into_iter()
            .map(|m| MemberInfo {
                user_id: m.user_id.clone(),
                display_name: m.display_name.clone(),
                ready: m.ready,
                connected: connected.contains(m.user_id.as_str()),
                joined_at: m.joined_at,
            })
            .collect();
        let current = members.iter().filter(|m| m.connected).count() as u32;
        Self {
            code: room.code.clone(),
            title: room.title.clone(),
            image: room.image.clone(),
            private: room.private,
            status: room.status,
            host_id: room.host_id.clone(),
            host_name: room.host_name.clone(),
            capacity: Capacity {
                current,
                max: crate::room::ROOM_CAPACITY as u32,
            },
            created_at: room.created_at,
            members,
            game,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoinedMsg {
    pub room_code: String,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeftMsg {
    pub room_code: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerReadyUpdateMsg {
    pub room_code: String,
    pub user_id: UserId,
    pub is_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostChangedMsg {
    pub room_code: String,
    pub new_host_id: UserId,
    pub new_host_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartedMsg {
    pub room_code: String,
    pub round: u32,
}

/// Unicast only: a player's own role for the new round. Must never be sent
/// through a room-wide scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignedMsg {
    pub room_code: String,
    pub round: u32,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipahiGuessedMsg {
    pub room_code: String,
    pub sipahi_id: UserId,
    pub suspect_id: UserId,
}

/// The one message that reveals the full role map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEndedMsg {
    pub room_code: String,
    pub round: u32,
    pub roles: HashMap<UserId, Role>,
    pub guess: Option<UserId>,
    pub guess_correct: bool,
    pub scores: HashMap<UserId, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBroadcastMsg {
    pub room_code: String,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    pub at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Ack(AckMsg),
    RoomState(Box<RoomSnapshot>),
    GameStateUpdate(Box<RoomSnapshot>),
    PlayerJoined(PlayerJoinedMsg),
    PlayerLeft(PlayerLeftMsg),
    PlayerReadyUpdate(PlayerReadyUpdateMsg),
    HostChanged(HostChangedMsg),
    GameStarted(GameStartedMsg),
    RoleAssigned(RoleAssignedMsg),
    SipahiGuessed(SipahiGuessedMsg),
    RoundEnded(RoundEndedMsg),
    ChatMessage(ChatBroadcastMsg),
    Error(ErrorMsg),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Ack(_) => MessageType::Ack,
            Self::RoomState(_) => MessageType::RoomState,
            Self::GameStateUpdate(_) => MessageType::GameStateUpdate,
            Self::PlayerJoined(_) => MessageType::PlayerJoined,
            Self::PlayerLeft(_) => MessageType::PlayerLeft,
            Self::PlayerReadyUpdate(_) => MessageType::PlayerReadyUpdate,
            Self::HostChanged(_) => MessageType::HostChanged,
            Self::GameStarted(_) => MessageType::GameStarted,
            Self::RoleAssigned(_) => MessageType::RoleAssigned,
            Self::SipahiGuessed(_) => MessageType::SipahiGuessed,
            Self::RoundEnded(_) => MessageType::RoundEnded,
            Self::ChatMessage(_) => MessageType::ChatMessage,
            Self::Error(_) => MessageType::Error,
        }
    }
}
