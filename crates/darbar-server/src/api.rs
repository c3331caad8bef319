use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use darbar_core::net::messages::{Capacity, GameAction, RoomSnapshot};
use darbar_core::room::{ROOM_CAPACITY, Room, RoomStatus, UserId};

use crate::error::AppError;
use crate::state::AppState;

/// REST mirror of the real-time operations, for clients that are not (yet)
/// on the WebSocket channel. Same coordinator, same error taxonomy.

#[derive(Debug, Deserialize)]
pub struct CreateRoomBody {
    pub title: String,
    pub image: Option<String>,
    #[serde(default)]
    pub private: bool,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomBody {
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRoomBody {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ReadyBody {
    pub user_id: UserId,
    pub is_ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartGameBody {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct GameActionBody {
    pub user_id: UserId,
    #[serde(flatten)]
    pub action: GameAction,
}

/// Lobby-browsing view of a persisted room row.
#[derive(Debug, Serialize)]
pub struct RoomListEntry {
    pub code: String,
    pub title: String,
    pub image: Option<String>,
    pub private: bool,
    pub status: RoomStatus,
    pub host_name: String,
    pub capacity: Capacity,
    pub created_at: u64,
}

impl From<&Room> for RoomListEntry {
    fn from(room: &Room) -> Self {
        Self {
            code: room.code.clone(),
            title: room.title.clone(),
            image: room.image.clone(),
            private: room.private,
            status: room.status,
            host_name: room.host_name.clone(),
            capacity: Capacity {
                current: room.member_count,
                max: ROOM_CAPACITY as u32,
            },
            created_at: room.created_at,
        }
    }
}

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 32 || name.chars().any(|c| c.is_control()) {
        return Err(AppError::BadRequest("invalid player name".to_string()));
    }
    Ok(name)
}

/// GET /api/v1/rooms — browseable rooms (inactive ones are gone).
pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<RoomListEntry>>, AppError> {
    let rooms = state.coordinator.list_rooms().await?;
    Ok(Json(rooms.iter().map(RoomListEntry::from).collect()))
}

/// POST /api/v1/rooms — create a room with the requester as host.
pub async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<RoomSnapshot>), AppError> {
    let name = validate_name(&body.user_name)?;
    let title = body.title.trim().to_string();
    if title.is_empty() || title.len() > 128 {
        return Err(AppError::BadRequest("invalid room title".to_string()));
    }
    let snapshot = state
        .coordinator
        .create_room(title, body.image, body.private, &body.user_id, name)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/rooms/{code} — live snapshot of one room.
pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    Ok(Json(state.coordinator.room_snapshot(&code).await?))
}

/// POST /api/v1/rooms/{code}/join
pub async fn join_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<JoinRoomBody>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let name = validate_name(&body.user_name)?;
    let snapshot = state
        .coordinator
        .join_room(&code, &body.user_id, name, None)
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/rooms/{code}/leave
pub async fn leave_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<LeaveRoomBody>,
) -> Result<Json<RoomSnapshot>, AppError> {
    Ok(Json(
        state.coordinator.leave_room(&code, &body.user_id).await?,
    ))
}

/// POST /api/v1/rooms/{code}/ready
pub async fn set_ready(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<ReadyBody>,
) -> Result<Json<RoomSnapshot>, AppError> {
    Ok(Json(
        state
            .coordinator
            .set_ready(&code, &body.user_id, body.is_ready)
            .await?,
    ))
}

/// POST /api/v1/rooms/{code}/start
pub async fn start_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<StartGameBody>,
) -> Result<Json<RoomSnapshot>, AppError> {
    Ok(Json(
        state.coordinator.start_game(&code, &body.user_id).await?,
    ))
}

/// POST /api/v1/rooms/{code}/action — chat / guess / end-round.
pub async fn game_action(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<GameActionBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .coordinator
        .game_action(&code, &body.user_id, body.action)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn test_state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    fn create_body(user: &str) -> CreateRoomBody {
        CreateRoomBody {
            title: "evening table".to_string(),
            image: None,
            private: false,
            user_id: user.to_string(),
            user_name: user.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn create_then_list_and_fetch() {
        let state = test_state();
        let (status, Json(created)) =
            create_room(State(state.clone()), Json(create_body("u1")))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.host_id, "u1");

        let Json(listing) = list_rooms(State(state.clone())).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].code, created.code);

        let Json(fetched) = get_room(State(state), Path(created.code.clone()))
            .await
            .unwrap();
        assert_eq!(fetched.code, created.code);
        assert_eq!(fetched.members.len(), 1);
    }

    #[tokio::test]
    async fn join_and_ready_through_rest() {
        let state = test_state();
        let (_, Json(created)) = create_room(State(state.clone()), Json(create_body("u1")))
            .await
            .unwrap();

        let Json(joined) = join_room(
            State(state.clone()),
            Path(created.code.clone()),
            Json(JoinRoomBody {
                user_id: "u2".to_string(),
                user_name: "P2".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(joined.members.len(), 2);

        let Json(ready) = set_ready(
            State(state),
            Path(created.code),
            Json(ReadyBody {
                user_id: "u2".to_string(),
                is_ready: true,
            }),
        )
        .await
        .unwrap();
        assert!(ready.members.iter().any(|m| m.user_id == "u2" && m.ready));
    }

    #[tokio::test]
    async fn start_without_a_full_table_conflicts() {
        let state = test_state();
        let (_, Json(created)) = create_room(State(state.clone()), Json(create_body("u1")))
            .await
            .unwrap();
        let result = start_game(
            State(state),
            Path(created.code),
            Json(StartGameBody {
                user_id: "u1".to_string(),
            }),
        )
        .await;
        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn bad_names_are_rejected() {
        let state = test_state();
        let mut body = create_body("u1");
        body.user_name = "   ".to_string();
        let result = create_room(State(state), Json(body)).await;
        assert!(matches!(result.unwrap_err(), AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = test_state();
        let result = get_room(State(state), Path("ZZZZZZ".to_string())).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }
}
