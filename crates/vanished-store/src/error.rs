use thiserror::Error;

/// Room rule violations. These are reported to the user verbatim and leave
/// no state change behind.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,

    #[error("Invalid room password")]
    InvalidPassword,

    #[error("Room not found")]
    RoomNotFound,

    #[error("You are already in a room. Use /leave-room first")]
    AlreadyInRoom,

    #[error("You are not in a room")]
    NotInRoom,

    #[error("A room with that name already exists")]
    NameTaken,
}

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A room rule rejected the operation.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Another connected user already holds this name.
    #[error("Username already in use")]
    UsernameTaken,

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored room id is not a UUID.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),
}

impl StoreError {
    /// The room rule behind this error, if any.
    pub fn room_error(&self) -> Option<RoomError> {
        match self {
            StoreError::Room(e) => Some(*e),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// True if `err` is a UNIQUE or PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
