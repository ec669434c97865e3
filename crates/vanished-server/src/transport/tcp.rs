//! Newline-delimited TCP transport.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use vanished_shared::constants::MAX_LINE_LEN;
use vanished_shared::ServerFrame;

use super::{single_line, FrameSource, Transport};
use crate::admission::Refusal;
use crate::connection;
use crate::error::{ServerError, TransportError};
use crate::state::AppState;

pub struct TcpTransport {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    identity: String,
}

pub struct TcpSource {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
}

impl TcpTransport {
    /// Split an accepted stream into its transport and line source.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> (Self, TcpSource) {
        let (read_half, write_half) = stream.into_split();
        let transport = Self {
            writer: Mutex::new(FramedWrite::new(write_half, LinesCodec::new())),
            identity: format!("tcp:{peer}"),
        };
        let source = TcpSource {
            reader: FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LEN)),
        };
        (transport, source)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, line: &str) -> Result<(), TransportError> {
        let line = single_line(line)?;
        let mut writer = self.writer.lock().await;
        writer.send(line).await?;
        Ok(())
    }

    async fn close(&self, reason: &str) -> Result<(), TransportError> {
        debug!(peer = %self.identity, reason, "closing tcp transport");
        let mut writer = self.writer.lock().await;
        SinkExt::<&str>::close(&mut *writer).await?;
        Ok(())
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

#[async_trait]
impl FrameSource for TcpSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.reader
            .next()
            .await
            .map(|res| res.map_err(TransportError::from))
    }
}

/// Accept loop for the line protocol. Runs until the listener fails.
pub async fn serve_tcp(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Accepting line-protocol connections");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let permit = match state.gate.admit(peer).await {
            Ok(permit) => permit,
            Err(Refusal::RateLimited) => {
                warn!(ip = %peer.ip(), "Rate limit exceeded, dropping connection");
                continue;
            }
            Err(Refusal::Full) => {
                warn!(peer = %peer, "Connection limit reached");
                let (transport, _) = TcpTransport::new(stream, peer);
                let notice = ServerFrame::info(ServerError::Capacity.user_message());
                let _ = transport.send(&notice.to_string()).await;
                let _ = transport.close("server full").await;
                continue;
            }
        };

        let (transport, source) = TcpTransport::new(stream, peer);
        let state = state.clone();
        tokio::spawn(async move {
            connection::run(state, Arc::new(transport), source).await;
            drop(permit);
        });
    }
}
