//! Connection admission: a token bucket per peer IP plus the cap on live
//! connections.
//!
//! Both listeners call [`Gate::admit`] with the peer address of the socket
//! itself. Forwarding headers are never consulted, so a client cannot pick
//! the bucket it is charged to.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Why a connection attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("too many connection attempts from this address")]
    RateLimited,

    #[error("connection limit reached")]
    Full,
}

impl From<Refusal> for ServerError {
    fn from(refusal: Refusal) -> Self {
        match refusal {
            Refusal::RateLimited => ServerError::RateLimited,
            Refusal::Full => ServerError::Capacity,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

impl Bucket {
    fn take(&mut self, now: Instant, rate: f64, burst: f64) -> bool {
        let earned = now.saturating_duration_since(self.refreshed).as_secs_f64() * rate;
        self.tokens = (self.tokens + earned).min(burst);
        self.refreshed = now;

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

/// Held by a connection task for its whole lifetime.
pub struct Permit {
    _slot: Option<OwnedSemaphorePermit>,
}

#[derive(Clone)]
pub struct Gate {
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
    rate: f64,
    burst: f64,
    slots: Option<Arc<Semaphore>>,
}

impl Gate {
    pub fn new(config: &ServerConfig) -> Self {
        let slots = (config.max_connections > 0)
            .then(|| Arc::new(Semaphore::new(config.max_connections)));
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate: config.connect_rate,
            burst: config.connect_burst,
            slots,
        }
    }

    /// Charge one attempt to `peer`'s address, then reserve a connection
    /// slot. A rate-limited attempt never takes a slot.
    pub async fn admit(&self, peer: SocketAddr) -> Result<Permit, Refusal> {
        let allowed = {
            let mut buckets = self.buckets.lock().await;
            let bucket = buckets.entry(peer.ip()).or_insert_with(|| Bucket {
                tokens: self.burst,
                refreshed: Instant::now(),
            });
            bucket.take(Instant::now(), self.rate, self.burst)
        };
        if !allowed {
            return Err(Refusal::RateLimited);
        }

        match &self.slots {
            None => Ok(Permit { _slot: None }),
            Some(slots) => slots
                .clone()
                .try_acquire_owned()
                .map(|slot| Permit { _slot: Some(slot) })
                .map_err(|_| Refusal::Full),
        }
    }

    /// Drop buckets untouched for `idle`. Returns how many went.
    pub async fn forget_idle(&self, idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.refreshed) < idle);
        let forgotten = before - buckets.len();
        if forgotten > 0 {
            debug!(forgotten, "Dropped idle rate-limit buckets");
        }
        forgotten
    }
}
