//! Room lifecycle operations.
//!
//! Every operation that touches more than one row runs inside a single
//! immediate transaction, so concurrent readers never observe a room
//! without its creator, a participant without its user update, or two
//! hosts at once. Dropping a [`rusqlite::Transaction`] without committing
//! rolls it back, which is how every early `?` return aborts cleanly.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

use vanished_shared::password::PasswordHasher;
use vanished_shared::types::{RoomId, UserId};

use crate::database::Database;
use crate::error::{is_unique_violation, Result, RoomError, StoreError};
use crate::models::{JoinOutcome, LeaveOutcome, Room, RoomSummary, User};
use crate::users::{format_timestamp, row_to_user, USER_COLUMNS};

const ROOM_COLUMNS: &str = "uuid, name, private, password_hash, salt, max_users";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert `room` and make `owner` its first participant and host.
    pub fn create_room_and_join(&mut self, room: &Room, owner: UserId) -> Result<()> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_user_exists(&tx, owner)?;
        if membership_of(&tx, owner)?.is_some() {
            return Err(RoomError::AlreadyInRoom.into());
        }

        tx.execute(
            "INSERT INTO rooms (uuid, name, private, password_hash, salt, max_users)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                room.id.to_string(),
                room.name,
                room.private,
                room.password_digest,
                room.salt,
                room.max_users,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Room(RoomError::NameTaken)
            } else {
                StoreError::Sqlite(e)
            }
        })?;

        add_participant(&tx, room.id, owner, true)?;

        tx.commit()?;

        tracing::debug!(room = %room.id, owner = %owner, "room created");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    /// Join the room called `name`.
    ///
    /// Checks, in order: the user is not already in a room, the room exists,
    /// the password matches (private rooms only), and the room has space.
    /// On any failure nothing is written.
    pub fn join_room(
        &mut self,
        user: UserId,
        name: &str,
        password: Option<&str>,
        hasher: &dyn PasswordHasher,
    ) -> Result<JoinOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_user_exists(&tx, user)?;
        if membership_of(&tx, user)?.is_some() {
            return Err(RoomError::AlreadyInRoom.into());
        }

        let room = tx
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE name = ?1"),
                params![name],
                row_to_room,
            )
            .optional()?
            .ok_or(RoomError::RoomNotFound)?;

        if room.private {
            let authorized = match (password, &room.password_digest, &room.salt) {
                (Some(password), Some(digest), Some(salt)) => {
                    hasher.verify(password, salt, digest)
                }
                _ => false,
            };
            if !authorized {
                return Err(RoomError::InvalidPassword.into());
            }
        }

        if participant_count_tx(&tx, room.id)? >= room.max_users {
            return Err(RoomError::RoomFull.into());
        }

        add_participant(&tx, room.id, user, false)?;

        let host = tx
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users u
                     WHERE u.uuid_current_room = ?1 AND u.is_owner = 1 AND u.uuid != ?2"
                ),
                params![room.id.to_string(), user.to_string()],
                row_to_user,
            )
            .optional()?;

        tx.commit()?;

        tracing::debug!(room = %room.id, user = %user, "room joined");
        Ok(JoinOutcome { room, host })
    }

    // ------------------------------------------------------------------
    // Leave
    // ------------------------------------------------------------------

    /// Take `user` out of whatever room it is in.
    ///
    /// Ownership is read from the user's row inside the transaction, so a
    /// host elected a moment ago by another departure still hands over. The
    /// successor is the remaining participant with the earliest `joined_at`;
    /// clearing the old flag, setting the new one, removing the participant
    /// and deleting an emptied room all commit together.
    pub fn leave_current_room(&mut self, user: UserId) -> Result<LeaveOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let room = membership_of(&tx, user)?.ok_or(RoomError::NotInRoom)?;

        let was_owner: bool = tx.query_row(
            "SELECT is_owner FROM users WHERE uuid = ?1",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        let successor = if was_owner {
            elect_successor(&tx, room, user)?
        } else {
            None
        };

        tx.execute(
            "DELETE FROM participants WHERE uuid_user = ?1",
            params![user.to_string()],
        )?;
        tx.execute(
            "UPDATE users SET uuid_current_room = NULL, is_owner = 0, joined_at = NULL
             WHERE uuid = ?1",
            params![user.to_string()],
        )?;

        let room_deleted = if participant_count_tx(&tx, room)? == 0 {
            tx.execute("DELETE FROM rooms WHERE uuid = ?1", params![room.to_string()])?;
            true
        } else {
            false
        };

        tx.commit()?;

        if room_deleted {
            tracing::debug!(room = %room, "room deleted after last participant left");
        }
        Ok(LeaveOutcome {
            room,
            room_deleted,
            successor,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_room(&self, id: RoomId) -> Result<Room> {
        self.conn()
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE uuid = ?1"),
                params![id.to_string()],
                row_to_room,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn get_room_by_name(&self, name: &str) -> Result<Room> {
        self.conn()
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE name = ?1"),
                params![name],
                row_to_room,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn participant_count(&self, room: RoomId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM participants WHERE uuid_room = ?1",
            params![room.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Users flagged as host of `room`. Exactly one for any non-empty room.
    pub fn list_hosts(&self, room: RoomId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users u
             WHERE u.uuid_current_room = ?1 AND u.is_owner = 1"
        ))?;
        let rows = stmt.query_map(params![room.to_string()], row_to_user)?;

        let mut hosts = Vec::new();
        for row in rows {
            hosts.push(row?);
        }
        Ok(hosts)
    }

    /// Public rooms with their occupancy, ordered by name.
    pub fn list_public_rooms(&self) -> Result<Vec<RoomSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.name, COUNT(p.uuid_user), r.max_users
             FROM rooms r
             LEFT JOIN participants p ON p.uuid_room = r.uuid
             WHERE r.private = 0
             GROUP BY r.uuid
             ORDER BY r.name ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RoomSummary {
                name: row.get(0)?,
                participants: row.get(1)?,
                max_users: row.get(2)?,
            })
        })?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(row?);
        }
        Ok(rooms)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_user_exists(tx: &Transaction<'_>, user: UserId) -> Result<()> {
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE uuid = ?1)",
        params![user.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound)
    }
}

fn membership_of(tx: &Transaction<'_>, user: UserId) -> Result<Option<RoomId>> {
    let room: Option<String> = tx
        .query_row(
            "SELECT uuid_room FROM participants WHERE uuid_user = ?1",
            params![user.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(room.as_deref().map(RoomId::parse).transpose()?)
}

/// Flag the longest-joined participant of `room` other than `departing` as
/// host and return it.
fn elect_successor(
    tx: &Transaction<'_>,
    room: RoomId,
    departing: UserId,
) -> Result<Option<User>> {
    let successor = tx
        .query_row(
            &format!(
                "SELECT {USER_COLUMNS}
                 FROM users u
                 INNER JOIN participants p ON p.uuid_user = u.uuid
                 WHERE p.uuid_room = ?1 AND u.uuid != ?2
                 ORDER BY u.joined_at ASC, p.rowid ASC
                 LIMIT 1"
            ),
            params![room.to_string(), departing.to_string()],
            row_to_user,
        )
        .optional()?;

    let Some(mut user) = successor else {
        return Ok(None);
    };
    tx.execute(
        "UPDATE users SET is_owner = 1 WHERE uuid = ?1",
        params![user.id.to_string()],
    )?;
    user.is_owner = true;
    Ok(Some(user))
}

fn participant_count_tx(tx: &Transaction<'_>, room: RoomId) -> Result<u32> {
    Ok(tx.query_row(
        "SELECT COUNT(*) FROM participants WHERE uuid_room = ?1",
        params![room.to_string()],
        |row| row.get(0),
    )?)
}

fn add_participant(tx: &Transaction<'_>, room: RoomId, user: UserId, owner: bool) -> Result<()> {
    tx.execute(
        "INSERT INTO participants (uuid_room, uuid_user) VALUES (?1, ?2)",
        params![room.to_string(), user.to_string()],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Room(RoomError::AlreadyInRoom)
        } else {
            StoreError::Sqlite(e)
        }
    })?;

    tx.execute(
        "UPDATE users SET uuid_current_room = ?1, is_owner = ?2, joined_at = ?3 WHERE uuid = ?4",
        params![
            room.to_string(),
            owner,
            format_timestamp(Utc::now()),
            user.to_string()
        ],
    )?;
    Ok(())
}

/// Map a `rusqlite::Row` selected with `ROOM_COLUMNS` to a [`Room`].
fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    let id_str: String = row.get(0)?;
    let id = RoomId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Room {
        id,
        name: row.get(1)?,
        private: row.get(2)?,
        password_digest: row.get(3)?,
        salt: row.get(4)?,
        max_users: row.get(5)?,
    })
}
