//! Room lifecycle commands: `/create`, `/join`, `/users`, `/rooms`,
//! `/leave-room`.

use tracing::info;

use vanished_shared::{Notice, ProtocolError, ServerFrame, UserId, Visibility};
use vanished_store::{LeaveOutcome, Room, RoomError};

use crate::config::MIN_ROOM_USERS;
use crate::error::ServerError;
use crate::registry::{ClientSession, Membership};
use crate::relay;
use crate::state::AppState;

pub(super) async fn create(
    state: &AppState,
    session: &ClientSession,
    name: String,
    visibility: Visibility,
    max_users: Option<u32>,
) -> Result<(), ServerError> {
    if state.registry.membership(session.user_id).await.room.is_some() {
        return Err(RoomError::AlreadyInRoom.into());
    }

    let max_users = max_users.unwrap_or(state.config.default_max_users);
    if !state.config.capacity_allowed(max_users) {
        return Err(ProtocolError::InvalidCapacity(format!(
            "{max_users} (allowed {MIN_ROOM_USERS}-{})",
            state.config.max_room_users
        ))
        .into());
    }

    let room = match visibility {
        Visibility::Public => Room::public(&name, max_users),
        Visibility::Private { password } => {
            let (digest, salt) = state.hash_password(password).await?;
            Room::private(&name, digest, salt, max_users)
        }
    };
    let room_id = room.id;
    let private = room.private;

    let owner = session.user_id;
    {
        let _transition = state.room_transition().await;
        state
            .with_store(move |db| db.create_room_and_join(&room, owner))
            .await?;
        state
            .registry
            .set_membership(owner, Membership::owner(room_id))
            .await;
    }

    info!(user = %session.username, room = %room_id, private, max_users, "Room created");
    relay::deliver(session, &Notice::RoomCreated(name).frame()).await;
    Ok(())
}

pub(super) async fn join(
    state: &AppState,
    session: &ClientSession,
    name: String,
    password: Option<String>,
) -> Result<(), ServerError> {
    let user = session.user_id;
    let hasher = state.hasher();
    let (outcome, room_id) = {
        let _transition = state.room_transition().await;
        let outcome = state
            .with_store(move |db| db.join_room(user, &name, password.as_deref(), hasher.as_ref()))
            .await?;
        let room_id = outcome.room.id;
        state.registry.enter_room(user, room_id).await;
        (outcome, room_id)
    };

    info!(user = %session.username, room = %room_id, "Room joined");
    relay::deliver(session, &Notice::RoomJoined(outcome.room.name.clone()).frame()).await;

    let joined = ServerFrame::UserJoined(session.username.clone());
    relay::broadcast(&state.registry, room_id, Some(user), &joined).await;

    if let Some(host) = outcome.host {
        relay::request_room_key(&state.registry, host.id, session).await;
    }
    Ok(())
}

pub(super) async fn users(state: &AppState, session: &ClientSession) -> Result<(), ServerError> {
    let Some(room) = state.registry.membership(session.user_id).await.room else {
        return Err(RoomError::NotInRoom.into());
    };

    let users = state
        .with_store(move |db| db.list_users_in_room(room))
        .await?;
    let names: Vec<String> = users
        .into_iter()
        .map(|u| {
            if u.is_owner {
                format!("{} (host)", u.username)
            } else {
                u.username
            }
        })
        .collect();

    let text = format!("Users in room: {}", names.join(", "));
    relay::deliver(session, &ServerFrame::info(text)).await;
    Ok(())
}

pub(super) async fn rooms(state: &AppState, session: &ClientSession) -> Result<(), ServerError> {
    let rooms = state.with_store(|db| db.list_public_rooms()).await?;

    let text = if rooms.is_empty() {
        "No public rooms available.".to_string()
    } else {
        let listed: Vec<String> = rooms
            .iter()
            .map(|r| format!("{} ({}/{})", r.name, r.participants, r.max_users))
            .collect();
        format!("Public rooms: {}", listed.join(", "))
    };
    relay::deliver(session, &ServerFrame::info(text)).await;
    Ok(())
}

pub(super) async fn leave(state: &AppState, session: &ClientSession) -> Result<(), ServerError> {
    depart_room(state, session.user_id, &session.username).await?;
    relay::deliver(session, &Notice::RoomLeft.frame()).await;
    Ok(())
}

/// Take `user` out of whatever room the store has it in.
///
/// The store decides ownership and elects a successor in the same
/// transaction that removes the participant. The registry is brought in
/// line before the transition guard drops; notices go out afterwards.
/// Used by `/leave-room` and by connection teardown.
pub(crate) async fn depart_room(
    state: &AppState,
    user: UserId,
    username: &str,
) -> Result<LeaveOutcome, ServerError> {
    let outcome = {
        let _transition = state.room_transition().await;
        let outcome = state
            .with_store(move |db| db.leave_current_room(user))
            .await?;
        state
            .registry
            .set_membership(user, Membership::default())
            .await;
        if let Some(successor) = &outcome.successor {
            state
                .registry
                .set_membership(successor.id, Membership::owner(outcome.room))
                .await;
        }
        outcome
    };

    let room = outcome.room;
    if let Some(successor) = &outcome.successor {
        info!(room = %room, from = %username, to = %successor.username, "Host promoted");
        relay::announce_promotion(&state.registry, room, successor.id, &successor.username).await;
    }

    if outcome.room_deleted {
        info!(room = %room, "Room deleted, last participant left");
    } else {
        relay::announce_departure(&state.registry, room, user, username).await;
    }

    Ok(outcome)
}
