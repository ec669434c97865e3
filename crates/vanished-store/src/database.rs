//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. Multi-row operations live
//! in [`crate::rooms`] and [`crate::users`] and each runs inside one
//! transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::Result;
use crate::migrations;
use crate::models::PurgeStats;

/// Path value that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `path`, or an in-memory database when `path` is `:memory:`.
    pub fn open(path: &str) -> Result<Self> {
        if path == IN_MEMORY {
            Self::open_in_memory()
        } else {
            Self::open_at(Path::new(path))
        }
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Nothing touches the disk.
    pub fn open_in_memory() -> Result<Self> {
        tracing::info!("opening in-memory database");
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return a mutable reference to the underlying connection.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Delete every user, room and participant row.
    ///
    /// Run at startup to clear rows left by a crash, and at shutdown so that
    /// no identifying data outlives the process.
    pub fn purge_ephemeral(&mut self) -> Result<PurgeStats> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let participants = tx.execute("DELETE FROM participants", [])?;
        let users = tx.execute("DELETE FROM users", [])?;
        let rooms = tx.execute("DELETE FROM rooms", [])?;

        tx.commit()?;

        Ok(PurgeStats {
            users,
            rooms,
            participants,
        })
    }
}
