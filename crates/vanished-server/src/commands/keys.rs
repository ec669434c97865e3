use tracing::debug;

use crate::registry::ClientSession;
use crate::relay;
use crate::state::AppState;

/// `/sendKey <user> <blob>`: forward a wrapped room key within the sender's
/// room. Never reports failure to the sender.
pub(super) async fn send_key(
    state: &AppState,
    session: &ClientSession,
    target: &str,
    wrapped_key: &str,
) {
    let Some(room) = state.registry.membership(session.user_id).await.room else {
        debug!(user = %session.username, "key relay from a user outside any room");
        return;
    };
    relay::relay_room_key(&state.registry, session, room, target, wrapped_key).await;
}
