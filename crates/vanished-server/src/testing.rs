//! Test harness: an in-memory broker and pre-registered peers.

use std::sync::Arc;
use std::time::Duration;

use vanished_shared::password::Argon2Hasher;
use vanished_shared::UserId;
use vanished_store::{Database, User};

use crate::config::ServerConfig;
use crate::registry::{ClientSession, Membership};
use crate::state::AppState;
use crate::transport::memory::MemoryTransport;

pub struct TestServer {
    pub state: AppState,
}

pub struct TestPeer {
    pub session: Arc<ClientSession>,
    pub transport: Arc<MemoryTransport>,
}

impl TestPeer {
    pub fn take(&self) -> Vec<String> {
        self.transport.take()
    }
}

pub fn cheap_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::with_params(1024, 1, 1).unwrap())
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let db = Database::open_in_memory().unwrap();
        Self {
            state: AppState::new(config, db, cheap_hasher()),
        }
    }

    /// Register `name` as if it had completed the handshake, with a
    /// placeholder public key.
    pub async fn connect(&self, name: &str) -> TestPeer {
        self.connect_with_key(name, &format!("{name}-pubkey")).await
    }

    pub async fn connect_with_key(&self, name: &str, public_key: &str) -> TestPeer {
        let user = User::new(UserId::new(), name, vec![0; 32], vec![0; 16], public_key);
        let user_id = user.id;
        self.state
            .with_store(move |db| db.create_user(&user))
            .await
            .unwrap();

        let transport = MemoryTransport::new(name);
        let session = Arc::new(ClientSession::new(
            user_id,
            name,
            public_key,
            transport.clone(),
        ));
        self.state.registry.put(session.clone()).await;
        TestPeer { session, transport }
    }

    pub async fn membership(&self, peer: &TestPeer) -> Membership {
        self.state.registry.membership(peer.session.user_id).await
    }

    /// Room affiliation as the store records it.
    pub async fn stored_membership(&self, peer: &TestPeer) -> Membership {
        let id = peer.session.user_id;
        let user = self
            .state
            .with_store(move |db| db.get_user(id))
            .await
            .unwrap();
        Membership {
            room: user.current_room,
            is_owner: user.is_owner,
        }
    }

    /// Host names and participant count of `room` as the store sees them.
    pub async fn census(&self, room: &str) -> (Vec<String>, u32) {
        let room = room.to_string();
        self.state
            .with_store(move |db| {
                let room = db.get_room_by_name(&room)?;
                let hosts = db
                    .list_hosts(room.id)?
                    .into_iter()
                    .map(|u| u.username)
                    .collect();
                Ok((hosts, db.participant_count(room.id)?))
            })
            .await
            .unwrap()
    }

    pub async fn count_users(&self) -> usize {
        self.state
            .with_store(|db| db.count_users())
            .await
            .unwrap()
    }
}

/// Poll `done` until it holds, failing the test after two seconds.
pub async fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
