//! Client-side room state and key custody.
//!
//! [`ClientState`] is a pure state machine: it consumes server frames and
//! returns the lines to send back and the events to surface. It never does
//! I/O, which keeps it usable from any transport and from tests.

use std::path::Path;

use tracing::{debug, warn};

use vanished_shared::crypto::{self, SymmetricKey};
use vanished_shared::keywrap::{self, PrivateKey, PublicKey};
use vanished_shared::{Command, Notice, ServerFrame};

use crate::error::{ClientError, Result};
use crate::events::{ClientAction, ClientEvent};

pub struct ClientState {
    username: String,
    private_key: PrivateKey,
    /// base64(SPKI PEM) of our public key, as sent at handshake.
    public_key: String,
    room: Option<String>,
    is_host: bool,
    room_key: Option<SymmetricKey>,
}

impl ClientState {
    pub fn new(username: impl Into<String>, private_key: PrivateKey) -> Result<Self> {
        let public_key = keywrap::encode_public_key(&PublicKey::from(&private_key))?;
        Ok(Self {
            username: username.into(),
            private_key,
            public_key,
            room: None,
            is_host: false,
            room_key: None,
        })
    }

    /// Load the RSA private key from a PKCS#1 or PKCS#8 PEM file.
    pub fn from_key_file(username: impl Into<String>, path: &Path) -> Result<Self> {
        Self::new(username, keywrap::load_private_key(path)?)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn has_room_key(&self) -> bool {
        self.room_key.is_some()
    }

    /// The three handshake lines: username, password, public key.
    pub fn handshake_lines(&self, password: &str) -> [String; 3] {
        [
            self.username.clone(),
            password.to_string(),
            self.public_key.clone(),
        ]
    }

    /// Encrypt `text` under the room key, ready to send as a chat line.
    pub fn outgoing_chat(&self, text: &str) -> Result<String> {
        let key = self.room_key.as_ref().ok_or(ClientError::NoRoomKey)?;
        Ok(crypto::encrypt_for_transport(key, text)?)
    }

    /// Parse and handle one line received from the server.
    pub fn handle_line(&mut self, line: &str) -> Result<Vec<ClientAction>> {
        let frame = ServerFrame::parse(line)?;
        self.handle_frame(frame)
    }

    pub fn handle_frame(&mut self, frame: ServerFrame) -> Result<Vec<ClientAction>> {
        let mut actions = Vec::new();

        match frame {
            ServerFrame::Chat { sender, payload } => {
                let event = match self.decrypt_chat(&payload) {
                    Some(text) => ClientEvent::Chat { sender, text },
                    None => ClientEvent::Undecryptable { sender },
                };
                actions.push(ClientAction::Notify(event));
            }

            ServerFrame::SystemInfo(text) => {
                if let Some(notice) = Notice::recognize(&text) {
                    actions.push(ClientAction::Notify(self.apply_notice(notice)));
                }
                actions.push(ClientAction::Notify(ClientEvent::Info { text }));
            }

            ServerFrame::UserJoined(username) => {
                actions.push(ClientAction::Notify(ClientEvent::UserJoined { username }));
            }

            ServerFrame::KeyRequest { from, public_key } => {
                let Some(key) = self.room_key.as_ref() else {
                    warn!(from = %from, "key requested but no room key held");
                    return Ok(actions);
                };
                let wrapped_key = keywrap::wrap_for_transport(key, &public_key)?;
                let reply = Command::SendKey {
                    target: from,
                    wrapped_key,
                };
                actions.push(ClientAction::Send(reply.to_string()));
            }

            ServerFrame::KeyDelivery { from, wrapped_key } => {
                let raw = keywrap::unwrap_from_transport(&wrapped_key, &self.private_key)?;
                self.room_key = Some(crypto::key_from_slice(&raw)?);
                debug!(from = %from, "room key installed");
                actions.push(ClientAction::Notify(ClientEvent::RoomKeyReceived { from }));
            }

            ServerFrame::HostPromoted => {
                self.is_host = true;
                if self.room_key.is_none() {
                    self.room_key = Some(crypto::generate_symmetric_key());
                }
                actions.push(ClientAction::Notify(ClientEvent::Promoted));
            }
        }

        Ok(actions)
    }

    fn apply_notice(&mut self, notice: Notice) -> ClientEvent {
        match notice {
            Notice::RoomCreated(room) => {
                self.room = Some(room.clone());
                self.is_host = true;
                self.room_key = Some(crypto::generate_symmetric_key());
                ClientEvent::RoomCreated { room }
            }
            Notice::RoomJoined(room) => {
                self.room = Some(room.clone());
                self.is_host = false;
                self.room_key = None;
                ClientEvent::RoomJoined { room }
            }
            Notice::RoomLeft => {
                self.room = None;
                self.is_host = false;
                self.room_key = None;
                ClientEvent::RoomLeft
            }
        }
    }

    fn decrypt_chat(&self, payload: &str) -> Option<String> {
        let key = self.room_key.as_ref()?;
        crypto::decrypt_for_transport(key, payload).ok()
    }
}
