use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::broadcast::LobbySender;
use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::rate_limit::ConnectionRateLimiter;
use crate::store::{MemoryStore, RoomStore};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub config: Arc<ServerConfig>,
    pub lobby: LobbySender,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub conn_limiter: Arc<ConnectionRateLimiter>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Build state around a specific store implementation. The coordinator,
    /// registry, and session table are owned here and live exactly as long
    /// as the process.
    pub fn with_store(config: ServerConfig, store: Arc<dyn RoomStore>) -> Self {
        let config = Arc::new(config);
        let (lobby, _) = tokio::sync::broadcast::channel(config.limits.lobby_feed_capacity);
        let coordinator = Arc::new(Coordinator::new(store, lobby.clone(), Arc::clone(&config)));
        let conn_limiter = Arc::new(ConnectionRateLimiter::new(
            Duration::from_secs(config.limits.connection_window_secs),
            config.limits.connections_per_window,
        ));
        Self {
            coordinator,
            config,
            lobby,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            conn_limiter,
        }
    }
}

/// RAII counter for live WebSocket connections.
pub struct ConnectionGuard {
    count: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self { count }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_guard_counts_up_and_down() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _a = ConnectionGuard::new(Arc::clone(&count));
            let _b = ConnectionGuard::new(Arc::clone(&count));
            assert_eq!(count.load(Ordering::Relaxed), 2);
        }
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
