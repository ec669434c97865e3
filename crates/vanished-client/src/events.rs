use serde::Serialize;

/// Something the embedding application should show or react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A decrypted chat line.
    Chat { sender: String, text: String },
    /// A chat line that could not be decrypted with the current room key.
    Undecryptable { sender: String },
    /// Any `SYSTEM_INFO` text, including the ones below.
    Info { text: String },
    RoomCreated { room: String },
    RoomJoined { room: String },
    RoomLeft,
    UserJoined { username: String },
    /// The room key arrived from the host.
    RoomKeyReceived { from: String },
    /// This client is now the room host.
    Promoted,
}

/// Outcome of handling one server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// A line to write back to the server.
    Send(String),
    Notify(ClientEvent),
}
