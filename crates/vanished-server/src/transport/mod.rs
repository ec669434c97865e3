//! Transport layer for client connections.
//!
//! The connection lifecycle, broadcast and key relay are written against
//! [`Transport`] (outbound) and [`FrameSource`] (inbound) only. Each
//! implementation serializes its own writes, so a command reply and a
//! broadcast line destined for the same client never interleave.

mod tcp;
mod ws;

#[cfg(test)]
pub(crate) mod memory;

pub use tcp::{serve_tcp, TcpSource, TcpTransport};
pub use ws::{WsSource, WsTransport};

use async_trait::async_trait;

use crate::error::TransportError;

/// Outbound half of a client connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one protocol line. A line containing `\n` or `\r` is refused
    /// with [`TransportError::LineBreak`] and nothing is written.
    async fn send(&self, line: &str) -> Result<(), TransportError>;

    /// Close the connection. Further sends fail.
    async fn close(&self, reason: &str) -> Result<(), TransportError>;

    /// Peer description for logs, e.g. `tcp:203.0.113.7:51234`.
    fn identity(&self) -> &str;
}

/// Inbound half of a client connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound line without its terminator, or `None` once the peer
    /// has gone away.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Refuse a line that would split into several frames on the wire.
pub(crate) fn single_line(line: &str) -> Result<&str, TransportError> {
    if line.contains(['\n', '\r']) {
        return Err(TransportError::LineBreak);
    }
    Ok(line)
}
