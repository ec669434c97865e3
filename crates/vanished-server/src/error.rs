use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use vanished_shared::{CryptoError, ProtocolError};
use vanished_store::{RoomError, StoreError};

/// Text shown to a client when the failure is on our side.
const GENERIC_FAILURE: &str = "The server could not complete that request. Please try again.";

/// Failures of a single transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line exceeds the maximum frame length")]
    FrameTooLarge,

    #[error("Outbound line contains a line break")]
    LineBreak,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Transport closed")]
    Closed,
}

impl From<tokio_util::codec::LinesCodecError> for TransportError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => TransportError::FrameTooLarge,
            tokio_util::codec::LinesCodecError::Io(e) => TransportError::Io(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed command. Reported to the sender, connection stays open.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Handshake policy violation. The connection is closed after the notice.
    #[error("{0}")]
    Auth(String),

    /// A room rule rejected the command. Nothing was written.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The store failed and the transaction was rolled back.
    #[error("Persistence error: {0}")]
    Persistence(StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] TransportError),

    #[error("Server is full")]
    Capacity,

    #[error("Too many connection attempts, try again shortly")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The `SYSTEM_INFO` text the offending client sees.
    pub fn user_message(&self) -> String {
        match self {
            ServerError::Protocol(e) => e.to_string(),
            ServerError::Auth(reason) => reason.clone(),
            ServerError::Room(e) => e.to_string(),
            ServerError::Capacity | ServerError::RateLimited => self.to_string(),
            ServerError::Persistence(_) | ServerError::Delivery(_) | ServerError::Internal(_) => {
                GENERIC_FAILURE.to_string()
            }
        }
    }

    /// Whether the failure is ours rather than the client's.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ServerError::Persistence(_) | ServerError::Delivery(_) | ServerError::Internal(_)
        )
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Room(e) => ServerError::Room(e),
            StoreError::UsernameTaken => ServerError::Auth("Username already in use".to_string()),
            other => ServerError::Persistence(other),
        }
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("blocking task failed: {err}"))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Capacity => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Protocol(_) | ServerError::Auth(_) | ServerError::Room(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.user_message(),
        });

        (status, axum::Json(body)).into_response()
    }
}
