//! # vanished-client
//!
//! Headless client core for Vanished Rooms. Rendering is left to the
//! embedding application; this crate handles the wire protocol and custody
//! of the room key:
//!
//! - the host generates the AES-256-GCM room key when it creates a room, or
//!   when it is promoted without holding one
//! - the host wraps that key under each joiner's RSA public key on request
//! - members unwrap the key they are sent and use it for chat

pub mod bridge;
pub mod error;
pub mod events;
pub mod state;

pub use bridge::{spawn_session, Connection, SessionHandle};
pub use error::ClientError;
pub use events::{ClientAction, ClientEvent};
pub use state::ClientState;
