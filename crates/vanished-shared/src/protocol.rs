//! Server-to-client frames.
//!
//! Every frame is one line of text with a fixed event prefix. Payloads that
//! the server relays (chat ciphertext, public keys, wrapped room keys) are
//! copied verbatim and never interpreted.

use std::fmt;

use crate::error::ProtocolError;

pub const EV_CHAT_MSG: &str = "CHAT_MSG";
pub const EV_SYSTEM_INFO: &str = "SYSTEM_INFO";
pub const EV_USER_JOINED: &str = "USER_JOINED";
pub const EV_KEY_DELIVERY: &str = "KEY_DELIVERY";
pub const EV_HOST_PROMOTED: &str = "HOST_PROMOTED";

const KEY_REQ_FROM: &str = "REQ_FROM";
const KEY_FROM: &str = "FROM";
const PROMOTED: &str = "PROMOTED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// `CHAT_MSG:[user]: <payload>`
    Chat { sender: String, payload: String },
    /// `SYSTEM_INFO:<text>`
    SystemInfo(String),
    /// `USER_JOINED:<username>`
    UserJoined(String),
    /// `KEY_DELIVERY:REQ_FROM:<user>:<pubkey>`, sent to the room owner.
    KeyRequest { from: String, public_key: String },
    /// `KEY_DELIVERY:FROM:<user>:<b64cipher>`, sent to one recipient.
    KeyDelivery { from: String, wrapped_key: String },
    /// `HOST_PROMOTED:PROMOTED`
    HostPromoted,
}

impl ServerFrame {
    /// A notice frame. Newlines are folded so the frame stays one line.
    pub fn info(text: impl Into<String>) -> Self {
        let text: String = text.into();
        ServerFrame::SystemInfo(text.replace(['\r', '\n'], " "))
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let malformed = || ProtocolError::MalformedFrame(prefix_of(line).to_string());

        let (event, rest) = line.split_once(':').ok_or_else(malformed)?;
        match event {
            EV_CHAT_MSG => {
                let rest = rest.strip_prefix('[').ok_or_else(malformed)?;
                let (sender, payload) = rest.split_once("]: ").ok_or_else(malformed)?;
                Ok(ServerFrame::Chat {
                    sender: sender.to_string(),
                    payload: payload.to_string(),
                })
            }
            EV_SYSTEM_INFO => Ok(ServerFrame::SystemInfo(rest.to_string())),
            EV_USER_JOINED => Ok(ServerFrame::UserJoined(rest.to_string())),
            EV_KEY_DELIVERY => {
                let mut parts = rest.splitn(3, ':');
                let kind = parts.next().ok_or_else(malformed)?;
                let from = parts.next().ok_or_else(malformed)?.to_string();
                let data = parts.next().ok_or_else(malformed)?.to_string();
                match kind {
                    KEY_REQ_FROM => Ok(ServerFrame::KeyRequest {
                        from,
                        public_key: data,
                    }),
                    KEY_FROM => Ok(ServerFrame::KeyDelivery {
                        from,
                        wrapped_key: data,
                    }),
                    _ => Err(malformed()),
                }
            }
            EV_HOST_PROMOTED if rest == PROMOTED => Ok(ServerFrame::HostPromoted),
            _ => Err(malformed()),
        }
    }
}

fn prefix_of(line: &str) -> &str {
    line.split(':').next().unwrap_or_default()
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerFrame::Chat { sender, payload } => {
                write!(f, "{EV_CHAT_MSG}:[{sender}]: {payload}")
            }
            ServerFrame::SystemInfo(text) => write!(f, "{EV_SYSTEM_INFO}:{text}"),
            ServerFrame::UserJoined(name) => write!(f, "{EV_USER_JOINED}:{name}"),
            ServerFrame::KeyRequest { from, public_key } => {
                write!(f, "{EV_KEY_DELIVERY}:{KEY_REQ_FROM}:{from}:{public_key}")
            }
            ServerFrame::KeyDelivery { from, wrapped_key } => {
                write!(f, "{EV_KEY_DELIVERY}:{KEY_FROM}:{from}:{wrapped_key}")
            }
            ServerFrame::HostPromoted => write!(f, "{EV_HOST_PROMOTED}:{PROMOTED}"),
        }
    }
}

/// `SYSTEM_INFO` texts that clients react to, not just display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RoomCreated(String),
    RoomJoined(String),
    RoomLeft,
}

const CREATED_PREFIX: &str = "Room '";
const CREATED_SUFFIX: &str = "' created. You are the host.";
const JOINED_PREFIX: &str = "Joined room '";
const JOINED_SUFFIX: &str = "'.";
const LEFT_TEXT: &str = "You left the room.";

impl Notice {
    pub fn recognize(text: &str) -> Option<Self> {
        if text == LEFT_TEXT {
            return Some(Notice::RoomLeft);
        }
        if let Some(name) = text
            .strip_prefix(CREATED_PREFIX)
            .and_then(|t| t.strip_suffix(CREATED_SUFFIX))
        {
            return Some(Notice::RoomCreated(name.to_string()));
        }
        text.strip_prefix(JOINED_PREFIX)
            .and_then(|t| t.strip_suffix(JOINED_SUFFIX))
            .map(|name| Notice::RoomJoined(name.to_string()))
    }

    pub fn frame(&self) -> ServerFrame {
        ServerFrame::info(self.to_string())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RoomCreated(name) => write!(f, "{CREATED_PREFIX}{name}{CREATED_SUFFIX}"),
            Notice::RoomJoined(name) => write!(f, "{JOINED_PREFIX}{name}{JOINED_SUFFIX}"),
            Notice::RoomLeft => f.write_str(LEFT_TEXT),
        }
    }
}
