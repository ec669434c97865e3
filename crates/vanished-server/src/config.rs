//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::str::FromStr;

use vanished_shared::constants::{
    ARGON2_ITERATIONS, ARGON2_MEMORY_KIB, ARGON2_PARALLELISM, DEFAULT_HTTP_PORT, DEFAULT_TCP_PORT,
    MIN_LOGIN_PASSWORD_LEN,
};

/// Smallest capacity a room may be created with.
pub const MIN_ROOM_USERS: u32 = 2;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listener for the line protocol.
    /// Env: `LISTEN_ADDR`
    /// Default: `0.0.0.0:7777`
    pub listen_addr: SocketAddr,

    /// Socket address for the HTTP (axum) server: probes and `/ws`.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Whether the WebSocket transport is served at `/ws`.
    /// Env: `WS_ENABLED` (true/false)
    /// Default: `true`
    pub ws_enabled: bool,

    /// SQLite file holding live users and rooms, or `:memory:`.
    /// Env: `DATABASE_PATH`
    /// Default: `vanished-rooms.db`
    pub database_path: String,

    /// Minimum login password length, in characters.
    /// Env: `MIN_PASSWORD_LEN`
    /// Default: `8`
    pub min_password_len: usize,

    /// Capacity of rooms created without `-m`.
    /// Env: `DEFAULT_MAX_USERS`
    /// Default: `10`
    pub default_max_users: u32,

    /// Upper bound accepted for `-m`.
    /// Env: `MAX_ROOM_USERS`
    /// Default: `50`
    pub max_room_users: u32,

    /// Maximum number of concurrent connections (0 = unlimited).
    /// Env: `MAX_CONNECTIONS`
    /// Default: `0`
    pub max_connections: usize,

    /// Connection attempts per second refilled into each peer IP's bucket.
    /// Env: `CONNECT_RATE`
    /// Default: `10`
    pub connect_rate: f64,

    /// Attempts a peer IP may make in a burst.
    /// Env: `CONNECT_BURST`
    /// Default: `30`
    pub connect_burst: f64,

    // -- Password hashing cost --

    /// Env: `ARGON2_MEMORY_KIB`
    pub argon2_memory_kib: u32,
    /// Env: `ARGON2_ITERATIONS`
    pub argon2_iterations: u32,
    /// Env: `ARGON2_PARALLELISM`
    pub argon2_parallelism: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_TCP_PORT).into(),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            ws_enabled: true,
            database_path: "vanished-rooms.db".to_string(),
            min_password_len: MIN_LOGIN_PASSWORD_LEN,
            default_max_users: 10,
            max_room_users: 50,
            max_connections: 0,
            connect_rate: 10.0,
            connect_burst: 30.0,
            argon2_memory_kib: ARGON2_MEMORY_KIB,
            argon2_iterations: ARGON2_ITERATIONS,
            argon2_parallelism: ARGON2_PARALLELISM,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "LISTEN_ADDR", &mut config.listen_addr);
        parse_into(&lookup, "HTTP_ADDR", &mut config.http_addr);

        if let Some(val) = lookup("WS_ENABLED") {
            config.ws_enabled = val != "false" && val != "0";
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = path;
            }
        }

        parse_into(&lookup, "MIN_PASSWORD_LEN", &mut config.min_password_len);
        parse_into(&lookup, "DEFAULT_MAX_USERS", &mut config.default_max_users);
        parse_into(&lookup, "MAX_ROOM_USERS", &mut config.max_room_users);
        parse_into(&lookup, "MAX_CONNECTIONS", &mut config.max_connections);
        parse_into(&lookup, "CONNECT_RATE", &mut config.connect_rate);
        parse_into(&lookup, "CONNECT_BURST", &mut config.connect_burst);
        parse_into(&lookup, "ARGON2_MEMORY_KIB", &mut config.argon2_memory_kib);
        parse_into(&lookup, "ARGON2_ITERATIONS", &mut config.argon2_iterations);
        parse_into(&lookup, "ARGON2_PARALLELISM", &mut config.argon2_parallelism);

        config.normalize_capacity();
        config.normalize_rate();

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Keep `MIN_ROOM_USERS <= default_max_users <= max_room_users`.
    fn normalize_capacity(&mut self) {
        let defaults = Self::default();

        if self.max_room_users < MIN_ROOM_USERS {
            tracing::warn!(
                value = self.max_room_users,
                "MAX_ROOM_USERS below {MIN_ROOM_USERS}, using default"
            );
            self.max_room_users = defaults.max_room_users;
        }

        if !(MIN_ROOM_USERS..=self.max_room_users).contains(&self.default_max_users) {
            let clamped = self
                .default_max_users
                .clamp(MIN_ROOM_USERS, self.max_room_users);
            tracing::warn!(
                value = self.default_max_users,
                clamped,
                "DEFAULT_MAX_USERS outside the allowed range"
            );
            self.default_max_users = clamped;
        }
    }

    /// A burst below one attempt would lock everyone out.
    fn normalize_rate(&mut self) {
        let defaults = Self::default();
        if !(self.connect_rate.is_finite() && self.connect_rate > 0.0) {
            tracing::warn!(value = self.connect_rate, "CONNECT_RATE must be positive, using default");
            self.connect_rate = defaults.connect_rate;
        }
        if !(self.connect_burst.is_finite() && self.connect_burst >= 1.0) {
            tracing::warn!(value = self.connect_burst, "CONNECT_BURST below 1, using default");
            self.connect_burst = defaults.connect_burst;
        }
    }

    /// Whether `-m <n>` is acceptable.
    pub fn capacity_allowed(&self, max_users: u32) -> bool {
        (MIN_ROOM_USERS..=self.max_room_users).contains(&max_users)
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => {
            tracing::warn!(value = %raw, "Invalid {key}, using default");
        }
    }
}
