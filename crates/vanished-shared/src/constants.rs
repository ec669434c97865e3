/// Application name
pub const APP_NAME: &str = "Vanished Rooms";

/// Leading character of every client command line
pub const COMMAND_SIGIL: char = '/';

/// AES-256-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// Symmetric room key size in bytes (AES-256)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Password salt size in bytes
pub const SALT_SIZE: usize = 16;

/// Argon2id output length in bytes
pub const PASSWORD_DIGEST_SIZE: usize = 32;

/// Argon2id defaults: 64 MiB, 2 passes, 4 lanes
pub const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
pub const ARGON2_ITERATIONS: u32 = 2;
pub const ARGON2_PARALLELISM: u32 = 4;

/// RSA modulus size clients should generate
pub const RSA_KEY_BITS: usize = 2048;

/// Minimum length of a private room password
pub const MIN_ROOM_PASSWORD_LEN: usize = 8;

/// Minimum length of a login password (server policy default)
pub const MIN_LOGIN_PASSWORD_LEN: usize = 8;

/// Maximum username length in characters
pub const MAX_USERNAME_LEN: usize = 32;

/// Maximum length of one protocol line (64 KiB)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Default TCP line-protocol port
pub const DEFAULT_TCP_PORT: u16 = 7777;

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
