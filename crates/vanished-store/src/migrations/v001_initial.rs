//! v001 -- Initial schema creation.
//!
//! Creates `rooms`, `users` and the `participants` join table. A user is in
//! at most one room, enforced by the UNIQUE constraint on
//! `participants.uuid_user`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    uuid          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL UNIQUE,
    password_hash BLOB,                        -- Argon2id digest, private rooms only
    salt          BLOB,
    private       INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    max_users     INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- Users (one row per live connection)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    uuid              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name              TEXT NOT NULL UNIQUE,
    password_hash     BLOB NOT NULL,               -- Argon2id digest
    salt              BLOB NOT NULL,
    public_rsa_key    TEXT NOT NULL DEFAULT '',    -- base64(SPKI PEM)
    is_owner          INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    uuid_current_room TEXT,                        -- nullable FK -> rooms(uuid)
    joined_at         TEXT,                        -- RFC-3339, nanosecond precision

    FOREIGN KEY (uuid_current_room) REFERENCES rooms(uuid) ON DELETE SET NULL
);

-- ----------------------------------------------------------------
-- Participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    uuid_room TEXT NOT NULL,
    uuid_user TEXT NOT NULL UNIQUE,

    PRIMARY KEY (uuid_room, uuid_user),
    FOREIGN KEY (uuid_room) REFERENCES rooms(uuid) ON DELETE CASCADE,
    FOREIGN KEY (uuid_user) REFERENCES users(uuid) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_room ON participants(uuid_room);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
