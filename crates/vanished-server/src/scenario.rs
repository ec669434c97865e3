//! End-to-end room flow with real RSA keys, driven through the dispatcher
//! and the client state machine.

use vanished_client::{ClientAction, ClientEvent, ClientState};
use vanished_shared::keywrap::generate_private_key;

use crate::commands::{self, chat};
use crate::connection::teardown;
use crate::testing::{TestPeer, TestServer};

struct Participant {
    client: ClientState,
    peer: TestPeer,
}

impl Participant {
    async fn join(server: &TestServer, name: &str) -> Self {
        let client = ClientState::new(name, generate_private_key(1024).unwrap()).unwrap();
        let peer = server.connect_with_key(name, client.public_key()).await;
        Self { client, peer }
    }

    /// Run every frame the server sent through the client. Returns the raw
    /// frames and the events they produced, and dispatches any replies.
    async fn pump(&mut self, server: &TestServer) -> (Vec<String>, Vec<ClientEvent>) {
        let frames = self.peer.take();
        let mut events = Vec::new();
        for frame in &frames {
            for action in self.client.handle_line(frame).unwrap() {
                match action {
                    ClientAction::Send(line) => {
                        commands::dispatch(&server.state, &self.peer.session, &line).await;
                    }
                    ClientAction::Notify(event) => events.push(event),
                }
            }
        }
        (frames, events)
    }

    async fn command(&self, server: &TestServer, line: &str) {
        commands::dispatch(&server.state, &self.peer.session, line).await;
    }
}

#[tokio::test]
async fn private_room_key_exchange_chat_and_succession() {
    let server = TestServer::new();
    let mut alice = Participant::join(&server, "alice").await;
    let mut bob = Participant::join(&server, "bob").await;

    // alice opens a private room and mints the room key
    alice
        .command(&server, "/create -n vault --private -p s3cret!! -m 4")
        .await;
    alice.pump(&server).await;
    assert!(alice.client.is_host());
    assert!(alice.client.has_room_key());

    // a wrong password is turned away before anything reaches alice
    bob.command(&server, "/join -n vault -p guess").await;
    let (frames, _) = bob.pump(&server).await;
    assert_eq!(frames, ["SYSTEM_INFO:Invalid room password"]);
    assert!(alice.peer.take().is_empty());

    bob.command(&server, "/join -n vault -p s3cret!!").await;
    let (_, events) = bob.pump(&server).await;
    assert!(events.contains(&ClientEvent::RoomJoined {
        room: "vault".into()
    }));
    assert!(!bob.client.has_room_key());

    // alice answers the key request; the relay only sees the wrapped blob
    let (frames, events) = alice.pump(&server).await;
    assert_eq!(frames[0], "USER_JOINED:bob");
    assert!(frames[1].starts_with("KEY_DELIVERY:REQ_FROM:bob:"));
    assert_eq!(
        events,
        [ClientEvent::UserJoined {
            username: "bob".into()
        }]
    );

    let (frames, events) = bob.pump(&server).await;
    assert_eq!(frames.len(), 1);
    assert!(frames[0].starts_with("KEY_DELIVERY:FROM:alice:"));
    assert_eq!(
        events,
        [ClientEvent::RoomKeyReceived {
            from: "alice".into()
        }]
    );
    assert!(bob.client.has_room_key());

    // encrypted chat in both directions
    let payload = alice.client.outgoing_chat("the eagle has landed").unwrap();
    chat(&server.state, &alice.peer.session, &payload).await;
    let (frames, events) = bob.pump(&server).await;
    assert_eq!(frames, [format!("CHAT_MSG:[alice]: {payload}")]);
    assert_eq!(
        events,
        [ClientEvent::Chat {
            sender: "alice".into(),
            text: "the eagle has landed".into()
        }]
    );
    assert!(alice.peer.take().is_empty());

    let payload = bob.client.outgoing_chat("copy that").unwrap();
    chat(&server.state, &bob.peer.session, &payload).await;
    let (_, events) = alice.pump(&server).await;
    assert_eq!(
        events,
        [ClientEvent::Chat {
            sender: "bob".into(),
            text: "copy that".into()
        }]
    );

    // alice drops; bob inherits the room and keeps the same key
    teardown(&server.state, alice.peer.session.user_id).await;

    let (frames, events) = bob.pump(&server).await;
    assert_eq!(
        frames,
        ["HOST_PROMOTED:PROMOTED", "SYSTEM_INFO:alice left the room."]
    );
    assert!(events.contains(&ClientEvent::Promoted));
    assert!(bob.client.is_host());
    assert!(server.membership(&bob.peer).await.is_owner);

    let room = server
        .state
        .with_store(|db| db.get_room_by_name("vault"))
        .await
        .unwrap();
    let hosts = server
        .state
        .with_store(move |db| db.list_hosts(room.id))
        .await
        .unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].username, "bob");
    assert_eq!(server.count_users().await, 1);
}

#[tokio::test]
async fn promoted_host_serves_the_next_joiner() {
    let server = TestServer::new();
    let mut alice = Participant::join(&server, "alice").await;
    let mut bob = Participant::join(&server, "bob").await;
    let mut carol = Participant::join(&server, "carol").await;

    alice.command(&server, "/create -n den --public").await;
    alice.pump(&server).await;
    bob.command(&server, "/join -n den").await;
    bob.pump(&server).await;
    alice.pump(&server).await;
    bob.pump(&server).await;

    alice.command(&server, "/leave-room").await;
    alice.pump(&server).await;
    bob.pump(&server).await;
    assert!(bob.client.is_host());

    // the key request now goes to bob, which wraps the inherited key
    carol.command(&server, "/join -n den").await;
    carol.pump(&server).await;
    let (frames, _) = bob.pump(&server).await;
    assert!(frames.iter().any(|f| f.starts_with("KEY_DELIVERY:REQ_FROM:carol:")));
    let (_, events) = carol.pump(&server).await;
    assert_eq!(
        events,
        [ClientEvent::RoomKeyReceived {
            from: "bob".into()
        }]
    );

    let payload = carol.client.outgoing_chat("hello den").unwrap();
    chat(&server.state, &carol.peer.session, &payload).await;
    let (_, events) = bob.pump(&server).await;
    assert_eq!(
        events,
        [ClientEvent::Chat {
            sender: "carol".into(),
            text: "hello den".into()
        }]
    );
}
