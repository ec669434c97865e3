//! Room commands and teardowns racing each other on a multi-threaded
//! runtime. Each test checks the room afterwards: one host, capacity
//! respected, and the registry cache agreeing with the store.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::commands::dispatch;
use crate::connection::teardown;
use crate::registry::ClientSession;
use crate::state::AppState;
use crate::testing::{TestPeer, TestServer};

const ROUNDS: usize = 25;

fn spawn_command(
    tasks: &mut JoinSet<()>,
    state: &AppState,
    session: &Arc<ClientSession>,
    line: &'static str,
) {
    let (state, session) = (state.clone(), session.clone());
    tasks.spawn(async move {
        dispatch(&state, &session, line).await;
    });
}

fn spawn_teardown(tasks: &mut JoinSet<()>, state: &AppState, peer: &TestPeer) {
    let (state, user) = (state.clone(), peer.session.user_id);
    tasks.spawn(async move { teardown(&state, user).await });
}

async fn finish(mut tasks: JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }
}

async fn assert_cache_matches_store(server: &TestServer, peers: &[&TestPeer]) {
    for peer in peers {
        assert_eq!(
            server.membership(peer).await,
            server.stored_membership(peer).await,
            "{}",
            peer.session.username
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_joins_never_overfill_a_room() {
    let server = TestServer::new();
    let alice = server.connect("alice").await;
    dispatch(&server.state, &alice.session, "/create -n lobby --public -m 3").await;

    let mut guests = Vec::new();
    for i in 0..8 {
        guests.push(server.connect(&format!("guest{i}")).await);
    }

    let mut tasks = JoinSet::new();
    for guest in &guests {
        spawn_command(&mut tasks, &server.state, &guest.session, "/join -n lobby");
    }
    finish(tasks).await;

    assert_eq!(server.census("lobby").await, (vec!["alice".to_string()], 3));

    let mut admitted = 0;
    for guest in &guests {
        let replies = guest.take();
        if server.membership(guest).await.room.is_some() {
            admitted += 1;
            assert!(replies.contains(&"SYSTEM_INFO:Joined room 'lobby'".to_string()));
        } else {
            assert_eq!(replies, ["SYSTEM_INFO:Room is full"]);
        }
    }
    assert_eq!(admitted, 2);

    let everyone: Vec<&TestPeer> = std::iter::once(&alice).chain(&guests).collect();
    assert_cache_matches_store(&server, &everyone).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn host_leave_racing_member_teardowns_leaves_one_host() {
    for _ in 0..ROUNDS {
        let server = TestServer::new();
        let alice = server.connect("alice").await;
        let bob = server.connect("bob").await;
        let carol = server.connect("carol").await;
        let dave = server.connect("dave").await;
        dispatch(&server.state, &alice.session, "/create -n lobby --public").await;
        for peer in [&bob, &carol, &dave] {
            dispatch(&server.state, &peer.session, "/join -n lobby").await;
        }

        let mut tasks = JoinSet::new();
        spawn_command(&mut tasks, &server.state, &alice.session, "/leave-room");
        spawn_teardown(&mut tasks, &server.state, &bob);
        spawn_teardown(&mut tasks, &server.state, &carol);
        finish(tasks).await;

        assert_eq!(server.census("lobby").await, (vec!["dave".to_string()], 1));
        assert!(server.membership(&dave).await.is_owner);
        assert_cache_matches_store(&server, &[&alice, &dave]).await;
        assert_eq!(server.count_users().await, 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joins_racing_a_host_leave_keep_the_promotion() {
    for _ in 0..ROUNDS {
        let server = TestServer::new();
        let alice = server.connect("alice").await;
        let bob = server.connect("bob").await;
        let carol = server.connect("carol").await;
        let dave = server.connect("dave").await;
        dispatch(&server.state, &alice.session, "/create -n lobby --public").await;
        dispatch(&server.state, &bob.session, "/join -n lobby").await;

        let mut tasks = JoinSet::new();
        spawn_command(&mut tasks, &server.state, &carol.session, "/join -n lobby");
        spawn_command(&mut tasks, &server.state, &alice.session, "/leave-room");
        spawn_command(&mut tasks, &server.state, &dave.session, "/join -n lobby");
        finish(tasks).await;

        let (hosts, count) = server.census("lobby").await;
        assert_eq!(hosts, ["bob"]);
        assert_eq!(count, 3);
        assert_cache_matches_store(&server, &[&alice, &bob, &carol, &dave]).await;

        // the cached host is the one that hands over next
        teardown(&server.state, bob.session.user_id).await;
        let (hosts, count) = server.census("lobby").await;
        assert_eq!(hosts.len(), 1);
        assert_eq!(count, 2);
        assert_cache_matches_store(&server, &[&carol, &dave]).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn succession_runs_down_the_join_order_on_disconnect() {
    let server = TestServer::new();
    let alice = server.connect("alice").await;
    let bob = server.connect("bob").await;
    let carol = server.connect("carol").await;
    dispatch(&server.state, &alice.session, "/create -n den --public").await;
    dispatch(&server.state, &bob.session, "/join -n den").await;
    dispatch(&server.state, &carol.session, "/join -n den").await;
    bob.take();
    carol.take();

    teardown(&server.state, alice.session.user_id).await;
    assert_eq!(server.census("den").await, (vec!["bob".to_string()], 2));
    assert_eq!(bob.take()[0], "HOST_PROMOTED:PROMOTED");
    assert_eq!(carol.take()[0], "SYSTEM_INFO:bob is now the host.");

    teardown(&server.state, bob.session.user_id).await;
    assert_eq!(server.census("den").await, (vec!["carol".to_string()], 1));
    assert_eq!(
        carol.take(),
        ["HOST_PROMOTED:PROMOTED", "SYSTEM_INFO:bob left the room."]
    );
    assert!(server.membership(&carol).await.is_owner);

    teardown(&server.state, carol.session.user_id).await;
    let rooms = server
        .state
        .with_store(|db| db.list_public_rooms())
        .await
        .unwrap();
    assert!(rooms.is_empty());
    assert_eq!(server.count_users().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn churn_keeps_room_invariants() {
    let server = TestServer::new();
    let mut peers = Vec::new();
    for i in 0..6 {
        peers.push(server.connect(&format!("user{i}")).await);
    }

    let mut tasks = JoinSet::new();
    for peer in &peers {
        let (state, session) = (server.state.clone(), peer.session.clone());
        tasks.spawn(async move {
            for _ in 0..10 {
                dispatch(&state, &session, "/join -n hub").await;
                if state.registry.membership(session.user_id).await.room.is_none() {
                    dispatch(&state, &session, "/create -n hub --public -m 3").await;
                }
                dispatch(&state, &session, "/leave-room").await;
            }
            dispatch(&state, &session, "/join -n hub").await;
            if state.registry.membership(session.user_id).await.room.is_none() {
                dispatch(&state, &session, "/create -n hub --public -m 3").await;
            }
        });
    }
    finish(tasks).await;

    let (hosts, count) = server.census("hub").await;
    assert_eq!(hosts.len(), 1);
    assert!((1..=3).contains(&count));

    let everyone: Vec<&TestPeer> = peers.iter().collect();
    assert_cache_matches_store(&server, &everyone).await;
}
