//! Domain model structs persisted in the SQLite database.
//!
//! Rows only live as long as the connection that created them; nothing here
//! is meant to outlive the server process.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vanished_shared::types::{RoomId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A connected principal. Created at handshake, deleted on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Argon2id digest of the login password. The plaintext is never stored.
    pub password_digest: Vec<u8>,
    pub salt: Vec<u8>,
    /// base64(SPKI PEM) RSA public key as supplied by the client. May be
    /// empty, in which case nobody can wrap a room key for this user.
    pub public_key: String,
    pub current_room: Option<RoomId>,
    /// True iff this user is the host of `current_room`.
    pub is_owner: bool,
    /// When the user entered `current_room`; orders host succession.
    pub joined_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        id: UserId,
        username: impl Into<String>,
        password_digest: Vec<u8>,
        salt: Vec<u8>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            password_digest,
            salt,
            public_key: public_key.into(),
            current_room: None,
            is_owner: false,
            joined_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A chat room. Exists exactly as long as it has at least one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    /// Unique, human-chosen name.
    pub name: String,
    pub private: bool,
    /// Present only for private rooms.
    pub password_digest: Option<Vec<u8>>,
    pub salt: Option<Vec<u8>>,
    pub max_users: u32,
}

impl Room {
    pub fn public(name: impl Into<String>, max_users: u32) -> Self {
        Self {
            id: RoomId::new(),
            name: name.into(),
            private: false,
            password_digest: None,
            salt: None,
            max_users,
        }
    }

    pub fn private(
        name: impl Into<String>,
        password_digest: Vec<u8>,
        salt: Vec<u8>,
        max_users: u32,
    ) -> Self {
        Self {
            id: RoomId::new(),
            name: name.into(),
            private: true,
            password_digest: Some(password_digest),
            salt: Some(salt),
            max_users,
        }
    }
}

/// One row of the `/rooms` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub participants: u32,
    pub max_users: u32,
}

// ---------------------------------------------------------------------------
// Operation outcomes
// ---------------------------------------------------------------------------

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: Room,
    /// The room's current host, who should be asked to hand over the key.
    pub host: Option<User>,
}

/// Result of removing a participant.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// The room the user was in.
    pub room: RoomId,
    /// The room had no participants left and was deleted.
    pub room_deleted: bool,
    /// Set when the departing user was host and someone remained.
    pub successor: Option<User>,
}

/// Row counts removed by [`crate::Database::purge_ephemeral`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub users: usize,
    pub rooms: usize,
    pub participants: usize,
}
