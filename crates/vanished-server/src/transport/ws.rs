//! WebSocket transport. Outbound, one text message per protocol line.
//! Inbound, a message may carry several lines; each one becomes its own
//! frame, exactly as it would over TCP.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use vanished_shared::constants::MAX_LINE_LEN;

use super::{single_line, FrameSource, Transport};
use crate::error::TransportError;

pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    identity: String,
}

pub struct WsSource<S = SplitStream<WebSocket>> {
    stream: S,
    pending: VecDeque<String>,
}

impl<S> WsSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: VecDeque::new(),
        }
    }
}

impl WsTransport {
    pub fn new(socket: WebSocket, peer: SocketAddr) -> (Self, WsSource) {
        let (sink, stream) = socket.split();
        let transport = Self {
            sink: Mutex::new(sink),
            identity: format!("ws:{peer}"),
        };
        (transport, WsSource::new(stream))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, line: &str) -> Result<(), TransportError> {
        let line = single_line(line)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(line.to_owned()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&self, reason: &str) -> Result<(), TransportError> {
        debug!(peer = %self.identity, reason, "closing websocket transport");
        let mut sink = self.sink.lock().await;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Owned(reason.to_owned()),
        };
        // The peer may already be gone; closing is best effort.
        let _ = sink.send(Message::Close(Some(frame))).await;
        sink.close()
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }

            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::WebSocket(e.to_string()))),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        return Some(Err(TransportError::WebSocket(
                            "binary frame is not UTF-8".to_string(),
                        )))
                    }
                },
                Message::Close(_) => return None,
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            if text.len() > MAX_LINE_LEN {
                return Some(Err(TransportError::FrameTooLarge));
            }
            // `lines` drops a trailing "\r" per line, as LinesCodec does
            self.pending.extend(text.lines().map(str::to_owned));
        }
    }
}
