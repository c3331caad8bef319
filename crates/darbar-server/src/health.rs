use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub rooms: RoomInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
}

#[derive(Serialize)]
pub struct RoomInfo {
    pub active: usize,
    pub sessions: usize,
}

/// GET /healthz — server status, connection count, live room count.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo {
            websocket: state.ws_connection_count.load(Ordering::Relaxed),
        },
        rooms: RoomInfo {
            active: state.coordinator.active_rooms(),
            sessions: state.coordinator.sessions.len(),
        },
    })
}

/// GET /readyz — verifies the store answers before reporting ready.
pub async fn readiness_check(State(state): State<AppState>) -> &'static str {
    match state.coordinator.list_rooms().await {
        Ok(_) => "ready",
        Err(_) => "not ready: store unreachable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[tokio::test]
    async fn health_reports_counts() {
        let state = AppState::new(ServerConfig::default());
        let Json(resp) = health_check(State(state)).await;
        assert_eq!(resp.status, "healthy");
        assert_eq!(resp.connections.websocket, 0);
        assert_eq!(resp.rooms.active, 0);
    }

    #[tokio::test]
    async fn readiness_with_memory_store() {
        let state = AppState::new(ServerConfig::default());
        assert_eq!(readiness_check(State(state)).await, "ready");
    }
}
