use thiserror::Error;

use vanished_shared::{CryptoError, ProtocolError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("No room key yet; wait for the host to send it")]
    NoRoomKey,

    #[error("Disconnected from server")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, ClientError>;
