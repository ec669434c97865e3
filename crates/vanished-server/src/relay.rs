//! Broadcast and key relay.
//!
//! Delivery is best effort: a failed write is logged and the scan moves on.
//! Relayed payloads (chat ciphertext, public keys, wrapped room keys) are
//! forwarded verbatim and never logged.

use tracing::{debug, warn};

use vanished_shared::{RoomId, ServerFrame, UserId};

use crate::registry::{ClientSession, SessionRegistry};

/// Send `frame` to one session, logging a failure instead of returning it.
pub async fn deliver(session: &ClientSession, frame: &ServerFrame) -> bool {
    match session.send(frame).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                user = %session.username,
                peer = %session.identity(),
                error = %e,
                "delivery failed"
            );
            false
        }
    }
}

/// Send `frame` to every session in `room` except `sender`.
///
/// Holds the registry read lock for the full scan. Returns the number of
/// sessions the frame reached.
pub async fn broadcast(
    registry: &SessionRegistry,
    room: RoomId,
    sender: Option<UserId>,
    frame: &ServerFrame,
) -> usize {
    let view = registry.room_view(room).await;
    let mut delivered = 0;
    for session in view.sessions() {
        if Some(session.user_id) == sender {
            continue;
        }
        if deliver(session, frame).await {
            delivered += 1;
        }
    }
    delivered
}

/// Ask the room host to wrap the room key for `joiner`.
///
/// No-op when the joiner supplied no public key or the host is gone.
pub async fn request_room_key(
    registry: &SessionRegistry,
    host: UserId,
    joiner: &ClientSession,
) -> bool {
    if joiner.public_key.is_empty() {
        debug!(user = %joiner.username, "no public key on record, skipping key request");
        return false;
    }

    let Some(host_session) = registry.get(host).await else {
        debug!(user = %joiner.username, "host session gone, skipping key request");
        return false;
    };

    let frame = ServerFrame::KeyRequest {
        from: joiner.username.clone(),
        public_key: joiner.public_key.clone(),
    };
    deliver(&host_session, &frame).await
}

/// Forward a wrapped room key from `sender` to the user named `target`.
///
/// The target must be another member of `room`; anything else is a silent
/// no-op.
pub async fn relay_room_key(
    registry: &SessionRegistry,
    sender: &ClientSession,
    room: RoomId,
    target: &str,
    wrapped_key: &str,
) -> bool {
    let recipient = match registry.find_by_username(target).await {
        Some((session, membership)) if membership.room == Some(room) => session,
        _ => {
            debug!(from = %sender.username, to = %target, "key relay target not in room");
            return false;
        }
    };

    if recipient.user_id == sender.user_id {
        return false;
    }

    let frame = ServerFrame::KeyDelivery {
        from: sender.username.clone(),
        wrapped_key: wrapped_key.to_string(),
    };
    let delivered = deliver(&recipient, &frame).await;
    if delivered {
        debug!(
            from = %sender.username,
            to = %recipient.username,
            size = wrapped_key.len(),
            "relayed room key"
        );
    }
    delivered
}

/// Tell `successor` it now hosts `room`, and the rest of the room who the
/// new host is. The registry must already record the promotion.
pub async fn announce_promotion(
    registry: &SessionRegistry,
    room: RoomId,
    successor: UserId,
    successor_name: &str,
) {
    match registry.get(successor).await {
        Some(session) => {
            deliver(&session, &ServerFrame::HostPromoted).await;
        }
        None => debug!(user = %successor_name, "promoted user already disconnected"),
    }

    let notice = ServerFrame::info(format!("{successor_name} is now the host."));
    broadcast(registry, room, Some(successor), &notice).await;
}

/// Tell the remaining members of `room` that `username` left.
pub async fn announce_departure(
    registry: &SessionRegistry,
    room: RoomId,
    departed: UserId,
    username: &str,
) {
    let notice = ServerFrame::info(format!("{username} left the room."));
    broadcast(registry, room, Some(departed), &notice).await;
}
