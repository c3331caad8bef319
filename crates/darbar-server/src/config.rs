use serde::Deserialize;

/// Top-level server configuration, loaded from `darbar.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
    pub sessions: SessionsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Sliding-window length for per-origin connection limiting.
    pub connection_window_secs: u64,
    /// Connection attempts allowed per origin within one window.
    pub connections_per_window: usize,
    /// Per-connection inbound message rate (token bucket, tokens/sec).
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
    pub room_mailbox_size: usize,
    pub lobby_feed_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            connection_window_secs: 60,
            connections_per_window: 10,
            ws_rate_limit_per_sec: 20.0,
            player_message_buffer: 256,
            room_mailbox_size: 64,
            lobby_feed_capacity: 1024,
        }
    }
}

/// Room lifecycle timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// How long an empty `waiting` room survives before going inactive.
    pub empty_room_timeout_ms: u64,
    /// Pause between a round-end reveal and the next deal.
    pub round_advance_delay_ms: u64,
    /// Rooms with no activity for this long are swept regardless of status.
    pub idle_room_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            empty_room_timeout_ms: 5 * 60 * 1000,
            round_advance_delay_ms: 5_000,
            idle_room_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Session retention.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Disconnected sessions are purged after this long.
    pub purge_after_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            purge_after_secs: 2 * 60 * 60,
        }
    }
}

impl ServerConfig {
    /// Validate configuration, exiting on fatal problems.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.limits.max_ws_connections == 0 {
            tracing::error!("limits.max_ws_connections must be > 0");
            std::process::exit(1);
        }
        if self.limits.connections_per_window == 0 || self.limits.connection_window_secs == 0 {
            tracing::error!("limits.connection window settings must be > 0");
            std::process::exit(1);
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            tracing::error!("limits.ws_rate_limit_per_sec must be > 0");
            std::process::exit(1);
        }
        if self.limits.player_message_buffer == 0 || self.limits.room_mailbox_size == 0 {
            tracing::error!("limits.buffer sizes must be > 0");
            std::process::exit(1);
        }
        if self.rooms.sweep_interval_secs == 0 {
            tracing::error!("rooms.sweep_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.rooms.empty_room_timeout_ms == 0 || self.rooms.round_advance_delay_ms == 0 {
            tracing::error!("rooms timers must be > 0");
            std::process::exit(1);
        }
    }

    /// Load config from `darbar.toml` if it exists, then apply env overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("darbar.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from darbar.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse darbar.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No darbar.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("DARBAR_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("DARBAR_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("DARBAR_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            config.limits.ws_rate_limit_per_sec = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.limits.connections_per_window, 10);
        assert_eq!(cfg.limits.connection_window_secs, 60);
        assert_eq!(cfg.rooms.empty_room_timeout_ms, 300_000);
        assert_eq!(cfg.rooms.round_advance_delay_ms, 5_000);
        assert_eq!(cfg.rooms.idle_room_timeout_secs, 1_800);
        assert_eq!(cfg.sessions.purge_after_secs, 7_200);
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"

[rooms]
round_advance_delay_ms = 2000
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.rooms.round_advance_delay_ms, 2000);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.rooms.empty_room_timeout_ms, 300_000);
        assert_eq!(cfg.limits.max_ws_connections, 200);
    }

    #[test]
    fn validate_accepts_defaults() {
        ServerConfig::default().validate();
    }
}
