//! Protocol dispatcher.
//!
//! A line is parsed once into a [`Command`] and handled by a total match.
//! Handler errors become a single `SYSTEM_INFO` frame for the sender; room
//! and protocol errors keep the connection open.

mod keys;
mod rooms;

use tracing::{debug, error};

use vanished_shared::command::HELP_LINES;
use vanished_shared::{Command, ServerFrame};

use crate::error::ServerError;
use crate::registry::ClientSession;
use crate::relay;
use crate::state::AppState;

pub(crate) use rooms::depart_room;

const JOIN_FIRST: &str = "You are not in a room. Use /join -n <name> or /create first.";
const FAREWELL: &str = "Goodbye.";

/// What the read loop does after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Handle one command line from `session`.
pub async fn dispatch(state: &AppState, session: &ClientSession, line: &str) -> Flow {
    let result = match Command::parse(line) {
        Ok(command) => execute(state, session, command).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(flow) => flow,
        Err(err) => {
            if err.is_internal() {
                error!(user = %session.username, error = %err, "command failed");
            } else {
                debug!(user = %session.username, error = %err, "command rejected");
            }
            relay::deliver(session, &ServerFrame::info(err.user_message())).await;
            Flow::Continue
        }
    }
}

async fn execute(
    state: &AppState,
    session: &ClientSession,
    command: Command,
) -> Result<Flow, ServerError> {
    match command {
        Command::Create {
            name,
            visibility,
            max_users,
        } => rooms::create(state, session, name, visibility, max_users).await?,
        Command::Join { name, password } => rooms::join(state, session, name, password).await?,
        Command::Users => rooms::users(state, session).await?,
        Command::Rooms => rooms::rooms(state, session).await?,
        Command::LeaveRoom => rooms::leave(state, session).await?,
        Command::SendKey {
            target,
            wrapped_key,
        } => keys::send_key(state, session, &target, &wrapped_key).await,
        Command::Help => {
            for line in HELP_LINES {
                relay::deliver(session, &ServerFrame::info(*line)).await;
            }
        }
        Command::Quit => {
            relay::deliver(session, &ServerFrame::info(FAREWELL)).await;
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}

/// Relay a non-command line to the sender's room as a chat frame.
pub async fn chat(state: &AppState, session: &ClientSession, payload: &str) {
    let membership = state.registry.membership(session.user_id).await;
    let Some(room) = membership.room else {
        relay::deliver(session, &ServerFrame::info(JOIN_FIRST)).await;
        return;
    };

    let frame = ServerFrame::Chat {
        sender: session.username.clone(),
        payload: payload.to_string(),
    };
    let delivered = relay::broadcast(&state.registry, room, Some(session.user_id), &frame).await;
    debug!(user = %session.username, room = %room, size = payload.len(), delivered, "chat relayed");
}
