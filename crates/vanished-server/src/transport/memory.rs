//! In-memory transport for driving the broker in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{single_line, FrameSource, Transport};
use crate::error::TransportError;

/// Records every line sent to it.
pub struct MemoryTransport {
    identity: String,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MemoryTransport {
    pub fn new(identity: &str) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.to_string(),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        })
    }

    /// Every line sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Drain and return the lines sent so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every further send fail, as a dead socket would.
    pub fn break_pipe(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, line: &str) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) || self.is_closed() {
            return Err(TransportError::Closed);
        }
        let line = single_line(line)?;
        self.sent.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn close(&self, _reason: &str) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Inbound lines fed by the test through a channel.
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

pub fn memory_source() -> (mpsc::UnboundedSender<String>, MemorySource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, MemorySource { rx })
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}
