pub mod api;
pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod room_actor;
pub mod sessions;
pub mod state;
pub mod store;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/rooms", get(api::list_rooms).post(api::create_room))
        .route("/rooms/{code}", get(api::get_room))
        .route("/rooms/{code}/join", post(api::join_room))
        .route("/rooms/{code}/leave", post(api::leave_room))
        .route("/rooms/{code}/ready", post(api::set_ready))
        .route("/rooms/{code}/start", post(api::start_game))
        .route("/rooms/{code}/action", post(api::game_action));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/api/v1", api_routes)
        .route("/healthz", get(health::health_check))
        .route("/readyz", get(health::readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

/// Background maintenance: periodic room sweep, session purge, and rate
/// limiter cleanup. Every error inside the loop is logged, never fatal.
pub fn spawn_maintenance(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.rooms.sweep_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            state.coordinator.sweep().await;
            state.conn_limiter.cleanup().await;
        }
    })
}
