//! # vanished-shared
//!
//! Types shared by the Vanished Rooms server and clients: typed ids, the
//! line protocol (commands and frames), and the cryptographic collaborators
//! (Argon2id password hashing, AES-256-GCM room encryption, RSA-OAEP key
//! wrapping).

pub mod command;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod keywrap;
pub mod password;
pub mod protocol;
pub mod types;

pub use command::Command;
pub use error::{CryptoError, ProtocolError};
pub use protocol::{Notice, ServerFrame};
pub use types::{RoomId, UserId, Visibility};
