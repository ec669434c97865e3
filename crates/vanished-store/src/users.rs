//! CRUD operations for [`User`] records.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use vanished_shared::types::{RoomId, UserId};

use crate::database::Database;
use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::User;

pub(crate) const USER_COLUMNS: &str = "u.uuid, u.name, u.password_hash, u.salt, u.public_rsa_key, \
     u.is_owner, u.uuid_current_room, u.joined_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a freshly authenticated user. Fails with
    /// [`StoreError::UsernameTaken`] if the name is already connected.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (uuid, name, password_hash, salt, public_rsa_key, is_owner)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.password_digest,
                    user.salt,
                    user.public_key,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::UsernameTaken
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.uuid = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.name = ?1"),
                params![username],
                row_to_user,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Participants of a room, earliest joiner first.
    pub fn list_users_in_room(&self, room_id: RoomId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS}
             FROM users u
             INNER JOIN participants p ON p.uuid_user = u.uuid
             WHERE p.uuid_room = ?1
             ORDER BY u.joined_at ASC, p.rowid ASC"
        ))?;

        let rows = stmt.query_map(params![room_id.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn count_users(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user by id. Returns `true` if a row was deleted. Any
    /// participant row goes with it through the foreign key cascade.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE uuid = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Timestamps are stored at fixed nanosecond width so that text order is
/// time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Map a `rusqlite::Row` selected with [`USER_COLUMNS`] to a [`User`].
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let username: String = row.get(1)?;
    let password_digest: Vec<u8> = row.get(2)?;
    let salt: Vec<u8> = row.get(3)?;
    let public_key: String = row.get(4)?;
    let is_owner: bool = row.get(5)?;
    let room_str: Option<String> = row.get(6)?;
    let joined_str: Option<String> = row.get(7)?;

    let id = UserId::parse(&id_str).map_err(|e| conversion_error(0, e))?;

    let current_room = room_str
        .map(|s| RoomId::parse(&s))
        .transpose()
        .map_err(|e| conversion_error(6, e))?;

    let joined_at = joined_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| conversion_error(7, e))?;

    Ok(User {
        id,
        username,
        password_digest,
        salt,
        public_key,
        current_room,
        is_owner,
        joined_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User::new(UserId::new(), name, vec![0xAA; 32], vec![0x01; 16], "cHVia2V5")
    }

    #[test]
    fn create_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        db.create_user(&alice).unwrap();

        let loaded = db.get_user(alice.id).unwrap();
        assert_eq!(loaded, alice);
        assert_eq!(db.get_user_by_name("alice").unwrap().id, alice.id);
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("alice")).unwrap();

        let err = db.create_user(&user("alice")).unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken));
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn delete_user() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        db.create_user(&alice).unwrap();

        assert!(db.delete_user(alice.id).unwrap());
        assert!(!db.delete_user(alice.id).unwrap());
        assert!(matches!(db.get_user(alice.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        // 0.5s is after 0.123s even though "5" < "123456789" would mislead a
        // variable-width encoding.
        assert!(format_timestamp(later) < format_timestamp(earlier));
    }
}
