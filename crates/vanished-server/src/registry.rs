//! Live session registry.
//!
//! One reader/writer lock guards every session. The map itself never leaves
//! this module: callers go through the operations below, and broadcasts
//! iterate a [`RoomView`] that keeps the read lock for the whole scan.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};

use vanished_shared::{RoomId, ServerFrame, UserId};

use crate::error::TransportError;
use crate::transport::Transport;

/// The live counterpart of a connected user.
pub struct ClientSession {
    pub user_id: UserId,
    pub username: String,
    /// base64(SPKI PEM) as supplied at handshake. May be empty.
    pub public_key: String,
    transport: Arc<dyn Transport>,
}

impl ClientSession {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        public_key: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            public_key: public_key.into(),
            transport,
        }
    }

    pub async fn send(&self, frame: &ServerFrame) -> Result<(), TransportError> {
        self.transport.send(&frame.to_string()).await
    }

    pub async fn close(&self, reason: &str) -> Result<(), TransportError> {
        self.transport.close(reason).await
    }

    pub fn identity(&self) -> &str {
        self.transport.identity()
    }
}

/// Cached room affiliation. The store is authoritative; this is refreshed
/// by every room-mutating command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Membership {
    pub room: Option<RoomId>,
    pub is_owner: bool,
}

impl Membership {
    pub fn member(room: RoomId) -> Self {
        Self {
            room: Some(room),
            is_owner: false,
        }
    }

    pub fn owner(room: RoomId) -> Self {
        Self {
            room: Some(room),
            is_owner: true,
        }
    }
}

struct Entry {
    session: Arc<ClientSession>,
    membership: Membership,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, session: Arc<ClientSession>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session.user_id,
            Entry {
                session,
                membership: Membership::default(),
            },
        );
    }

    pub async fn remove(&self, id: UserId) -> Option<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id).map(|entry| entry.session)
    }

    pub async fn get(&self, id: UserId) -> Option<Arc<ClientSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).map(|entry| entry.session.clone())
    }

    /// Membership of `id`; unaffiliated if the session is gone.
    pub async fn membership(&self, id: UserId) -> Membership {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .map(|entry| entry.membership)
            .unwrap_or_default()
    }

    /// Returns `false` if the session is no longer registered.
    pub async fn set_membership(&self, id: UserId, membership: Membership) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(entry) => {
                entry.membership = membership;
                true
            }
            None => false,
        }
    }

    /// Record `id` as a member of `room`. A host of that same room stays
    /// host: a promotion may already have landed for this user.
    pub async fn enter_room(&self, id: UserId, room: RoomId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(entry) => {
                let already_host = entry.membership == Membership::owner(room);
                entry.membership = Membership {
                    room: Some(room),
                    is_owner: already_host,
                };
                true
            }
            None => false,
        }
    }

    /// Linear scan by username.
    pub async fn find_by_username(&self, username: &str) -> Option<(Arc<ClientSession>, Membership)> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .find(|entry| entry.session.username == username)
            .map(|entry| (entry.session.clone(), entry.membership))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshot of every session, for shutdown.
    pub async fn all(&self) -> Vec<Arc<ClientSession>> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|entry| entry.session.clone()).collect()
    }

    /// Read-locked view of the sessions in `room`. Membership changes wait
    /// until the view is dropped.
    pub async fn room_view(&self, room: RoomId) -> RoomView<'_> {
        RoomView {
            guard: self.sessions.read().await,
            room,
        }
    }
}

pub struct RoomView<'a> {
    guard: RwLockReadGuard<'a, HashMap<UserId, Entry>>,
    room: RoomId,
}

impl RoomView<'_> {
    pub fn sessions(&self) -> impl Iterator<Item = &Arc<ClientSession>> + '_ {
        let room = self.room;
        self.guard
            .values()
            .filter(move |entry| entry.membership.room == Some(room))
            .map(|entry| &entry.session)
    }
}
