//! Connection lifecycle: handshake, read loop, teardown.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use vanished_shared::command::is_command;
use vanished_shared::constants::MAX_USERNAME_LEN;
use vanished_shared::keywrap::decode_public_key;
use vanished_shared::{ServerFrame, UserId};
use vanished_store::{RoomError, User};

use crate::commands::{self, depart_room, Flow};
use crate::error::{ServerError, TransportError};
use crate::registry::ClientSession;
use crate::state::AppState;
use crate::transport::{FrameSource, Transport};

/// Lines read during the handshake, before any session exists.
struct Credentials {
    username: String,
    password: String,
    public_key: String,
}

/// Drive one accepted transport until it disconnects.
pub async fn run<S>(state: AppState, transport: Arc<dyn Transport>, mut source: S)
where
    S: FrameSource,
{
    let peer = transport.identity().to_string();
    debug!(peer = %peer, "connection accepted");

    let session = match handshake(&state, transport.clone(), &mut source).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(peer = %peer, "peer left during handshake");
            let _ = transport.close("handshake incomplete").await;
            return;
        }
        Err(err) => {
            warn!(peer = %peer, error = %err, "handshake rejected");
            let notice = ServerFrame::info(err.user_message());
            let _ = transport.send(&notice.to_string()).await;
            let _ = transport.close("handshake rejected").await;
            return;
        }
    };

    info!(user = %session.username, peer = %peer, "User connected");
    read_loop(&state, &session, &mut source).await;

    teardown(&state, session.user_id).await;
    let _ = transport.close("connection closed").await;
    info!(user = %session.username, peer = %peer, "User disconnected");
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Read username, password and public key, then register the user.
/// `Ok(None)` means the peer hung up before finishing.
async fn handshake<S: FrameSource>(
    state: &AppState,
    transport: Arc<dyn Transport>,
    source: &mut S,
) -> Result<Option<Arc<ClientSession>>, ServerError> {
    let Some(credentials) = read_credentials(source).await? else {
        return Ok(None);
    };

    validate_username(&credentials.username)?;
    if credentials.password.chars().count() < state.config.min_password_len {
        return Err(ServerError::Auth(format!(
            "Password must be at least {} characters",
            state.config.min_password_len
        )));
    }
    if !credentials.public_key.is_empty() && decode_public_key(&credentials.public_key).is_err() {
        return Err(ServerError::Auth("Invalid public key".to_string()));
    }

    let Credentials {
        username,
        password,
        public_key,
    } = credentials;

    // The plaintext password is consumed here and dropped with the task.
    let (digest, salt) = state.hash_password(password).await?;

    let user = User::new(UserId::new(), &username, digest, salt, &public_key);
    let user_id = user.id;
    state.with_store(move |db| db.create_user(&user)).await?;

    let session = Arc::new(ClientSession::new(user_id, username, public_key, transport));
    state.registry.put(session.clone()).await;

    let welcome = ServerFrame::info(format!(
        "Welcome, {}. Type /help for commands.",
        session.username
    ));
    if let Err(e) = session.send(&welcome).await {
        debug!(user = %session.username, error = %e, "welcome not delivered");
    }

    Ok(Some(session))
}

async fn read_credentials<S: FrameSource>(
    source: &mut S,
) -> Result<Option<Credentials>, ServerError> {
    let mut lines = Vec::with_capacity(3);
    while lines.len() < 3 {
        match source.next_frame().await {
            Some(Ok(line)) => lines.push(line.trim().to_string()),
            Some(Err(TransportError::FrameTooLarge)) => {
                return Err(ServerError::Auth("Handshake line too long".to_string()))
            }
            Some(Err(e)) => {
                debug!(error = %e, "read failed during handshake");
                return Ok(None);
            }
            None => return Ok(None),
        }
    }

    let mut lines = lines.into_iter();
    Ok(Some(Credentials {
        username: lines.next().unwrap_or_default(),
        password: lines.next().unwrap_or_default(),
        public_key: lines.next().unwrap_or_default(),
    }))
}

/// Non-empty, at most [`MAX_USERNAME_LEN`] characters, no whitespace and no
/// `:` (the frame field separator).
fn validate_username(username: &str) -> Result<(), ServerError> {
    if username.is_empty() {
        return Err(ServerError::Auth("Username must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ServerError::Auth(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(ServerError::Auth(
            "Username must not contain spaces or ':'".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

async fn read_loop<S: FrameSource>(state: &AppState, session: &ClientSession, source: &mut S) {
    loop {
        let line = match source.next_frame().await {
            Some(Ok(line)) => line,
            Some(Err(TransportError::FrameTooLarge)) => {
                let notice = ServerFrame::info("Line too long, message dropped.");
                if session.send(&notice).await.is_err() {
                    break;
                }
                continue;
            }
            Some(Err(e)) => {
                debug!(user = %session.username, error = %e, "read failed");
                break;
            }
            None => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if is_command(line) {
            if commands::dispatch(state, session, line).await == Flow::Quit {
                break;
            }
        } else {
            commands::chat(state, session, line).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Unwind a departed user: drop the session, leave its room (handing over
/// if the store still records it as host), delete the user row. The user
/// row goes even when the leave failed.
pub(crate) async fn teardown(state: &AppState, user: UserId) {
    let Some(session) = state.registry.remove(user).await else {
        return;
    };
    release(state, &session).await;
}

/// Store-side half of [`teardown`], for a session already out of the
/// registry.
pub(crate) async fn release(state: &AppState, session: &ClientSession) {
    let user = session.user_id;
    match depart_room(state, user, &session.username).await {
        Ok(_) | Err(ServerError::Room(RoomError::NotInRoom)) => {}
        Err(e) => error!(user = %session.username, error = %e, "leaving room failed"),
    }

    if let Err(e) = state.with_store(move |db| db.delete_user(user)).await {
        error!(user = %session.username, error = %e, "deleting user failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{wait_for, TestServer};
    use crate::transport::memory::{memory_source, MemoryTransport};

    #[test]
    fn username_policy() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username("a:b").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
        assert!(validate_username(&"x".repeat(32)).is_ok());
    }

    #[tokio::test]
    async fn short_password_closes_connection() {
        let server = TestServer::new();
        let transport = MemoryTransport::new("tcp:test");
        let (tx, source) = memory_source();
        for line in ["alice", "short", ""] {
            tx.send(line.to_string()).unwrap();
        }

        run(server.state.clone(), transport.clone(), source).await;

        assert_eq!(
            transport.sent(),
            ["SYSTEM_INFO:Password must be at least 8 characters"]
        );
        assert!(transport.is_closed());
        assert_eq!(server.count_users().await, 0);
    }

    #[tokio::test]
    async fn invalid_public_key_rejected() {
        let server = TestServer::new();
        let transport = MemoryTransport::new("tcp:test");
        let (tx, source) = memory_source();
        for line in ["alice", "password123", "bm90IGEga2V5"] {
            tx.send(line.to_string()).unwrap();
        }

        run(server.state.clone(), transport.clone(), source).await;

        assert_eq!(transport.sent(), ["SYSTEM_INFO:Invalid public key"]);
        assert_eq!(server.count_users().await, 0);
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let server = TestServer::new();
        let _alice = server.connect("alice").await;

        let transport = MemoryTransport::new("tcp:test");
        let (tx, source) = memory_source();
        for line in ["alice", "password123", ""] {
            tx.send(line.to_string()).unwrap();
        }

        run(server.state.clone(), transport.clone(), source).await;

        assert_eq!(transport.sent(), ["SYSTEM_INFO:Username already in use"]);
        assert!(transport.is_closed());
        assert_eq!(server.state.registry.len().await, 1);
    }

    #[tokio::test]
    async fn hangup_during_handshake_leaves_nothing() {
        let server = TestServer::new();
        let transport = MemoryTransport::new("tcp:test");
        let (tx, source) = memory_source();
        tx.send("alice".to_string()).unwrap();
        drop(tx);

        run(server.state.clone(), transport.clone(), source).await;

        assert!(transport.sent().is_empty());
        assert_eq!(server.count_users().await, 0);
    }

    #[tokio::test]
    async fn session_lifecycle_with_chat_and_quit() {
        let server = TestServer::new();
        let bob = server.connect("bob").await;

        let transport = MemoryTransport::new("tcp:alice");
        let (tx, source) = memory_source();
        let task = tokio::spawn(run(server.state.clone(), transport.clone(), source));

        for line in ["alice", "password123", "", "not in a room yet", "/create -n lobby --public"] {
            tx.send(line.to_string()).unwrap();
        }
        wait_for(|| transport.sent().len() >= 3).await;

        crate::commands::dispatch(&server.state, &bob.session, "/join -n lobby").await;
        bob.take();

        for line in ["", "   ", "Y2lwaGVydGV4dA==", "/quit"] {
            tx.send(line.to_string()).unwrap();
        }
        task.await.unwrap();

        assert_eq!(
            transport.sent(),
            [
                "SYSTEM_INFO:Welcome, alice. Type /help for commands.".to_string(),
                "SYSTEM_INFO:You are not in a room. Use /join -n <name> or /create first."
                    .to_string(),
                "SYSTEM_INFO:Room 'lobby' created. You are the host.".to_string(),
                "USER_JOINED:bob".to_string(),
                format!("KEY_DELIVERY:REQ_FROM:bob:{}", bob.session.public_key),
                "SYSTEM_INFO:Goodbye.".to_string(),
            ]
        );
        assert!(transport.is_closed());

        // bob saw the chat line, took over the room, and alice is gone
        assert_eq!(
            bob.take(),
            [
                "CHAT_MSG:[alice]: Y2lwaGVydGV4dA==",
                "HOST_PROMOTED:PROMOTED",
                "SYSTEM_INFO:alice left the room.",
            ]
        );
        assert_eq!(server.count_users().await, 1);
        assert!(server.membership(&bob).await.is_owner);
    }

    #[tokio::test]
    async fn teardown_of_last_member_deletes_room() {
        let server = TestServer::new();
        let alice = server.connect("alice").await;
        crate::commands::dispatch(&server.state, &alice.session, "/create -n solo --public").await;

        teardown(&server.state, alice.session.user_id).await;

        assert_eq!(server.count_users().await, 0);
        let rooms = server
            .state
            .with_store(|db| db.list_public_rooms())
            .await
            .unwrap();
        assert!(rooms.is_empty());
        assert!(server.state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn teardown_after_promotion_hands_over_again() {
        let server = TestServer::new();
        let alice = server.connect("alice").await;
        let bob = server.connect("bob").await;
        let carol = server.connect("carol").await;
        for (peer, line) in [
            (&alice, "/create -n lobby --public"),
            (&bob, "/join -n lobby"),
            (&carol, "/join -n lobby"),
        ] {
            crate::commands::dispatch(&server.state, &peer.session, line).await;
        }

        // bob's session is gone but the store still holds bob when alice
        // leaves, so bob is elected and must hand over in turn
        let bob_session = server.state.registry.remove(bob.session.user_id).await.unwrap();
        crate::commands::dispatch(&server.state, &alice.session, "/leave-room").await;
        assert_eq!(server.census("lobby").await, (vec!["bob".to_string()], 2));

        release(&server.state, &bob_session).await;

        assert_eq!(server.census("lobby").await, (vec!["carol".to_string()], 1));
        assert!(server.membership(&carol).await.is_owner);
        assert!(carol
            .take()
            .contains(&"HOST_PROMOTED:PROMOTED".to_string()));
        assert_eq!(server.count_users().await, 2);
    }

    #[tokio::test]
    async fn release_outside_a_room_only_deletes_the_user() {
        let server = TestServer::new();
        let alice = server.connect("alice").await;

        teardown(&server.state, alice.session.user_id).await;
        teardown(&server.state, alice.session.user_id).await;

        assert_eq!(server.count_users().await, 0);
        assert!(alice.take().is_empty());
    }
}
