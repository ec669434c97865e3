//! # vanished-store
//!
//! Ephemeral SQLite persistence for the Vanished Rooms broker.
//!
//! The store holds connected users, rooms and room membership. Nothing in it
//! is meant to survive the process: the server purges every table at startup
//! and again at shutdown. The crate exposes a synchronous `Database` handle
//! that wraps a `rusqlite::Connection`; every operation that changes more
//! than one row commits atomically.

pub mod database;
pub mod migrations;
pub mod models;
pub mod rooms;
pub mod users;

mod error;

pub use database::{Database, IN_MEMORY};
pub use error::{Result, RoomError, StoreError};
pub use models::*;
