use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use vanished_shared::command::is_command;
use vanished_shared::constants::MAX_LINE_LEN;
use vanished_shared::Command;

use crate::error::{ClientError, Result};
use crate::events::{ClientAction, ClientEvent};
use crate::state::ClientState;

const EVENT_BUFFER: usize = 256;
const INPUT_BUFFER: usize = 64;

/// A line-framed TCP connection to the broker.
pub struct Connection {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl Connection {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LEN)),
            writer: FramedWrite::new(write_half, LinesCodec::new()),
        }
    }

    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.send(line).await?;
        Ok(())
    }

    /// `Ok(None)` once the server has closed the connection.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        match self.reader.next().await {
            Some(line) => Ok(Some(line?)),
            None => Ok(None),
        }
    }

    /// Send the three handshake lines. The server answers with a welcome
    /// notice or a rejection, both of which arrive through [`next_line`].
    ///
    /// [`next_line`]: Connection::next_line
    pub async fn handshake(&mut self, state: &ClientState, password: &str) -> Result<()> {
        for line in state.handshake_lines(password) {
            self.send_line(&line).await?;
        }
        Ok(())
    }
}

/// Handle to a running session task.
pub struct SessionHandle {
    input: mpsc::Sender<String>,
    events: mpsc::Receiver<ClientEvent>,
    task: JoinHandle<Result<()>>,
}

impl SessionHandle {
    /// Submit a line typed by the user. Commands go out unchanged; anything
    /// else is encrypted under the room key first.
    pub async fn send(&self, line: impl Into<String>) -> Result<()> {
        self.input
            .send(line.into())
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Send `/quit` and wait for the server to close the connection.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.input);
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "session task panicked");
                Err(ClientError::Disconnected)
            }
        }
    }
}

/// Connect, perform the handshake and spawn the session loop.
pub async fn spawn_session(
    addr: impl ToSocketAddrs,
    state: ClientState,
    password: &str,
) -> Result<SessionHandle> {
    let mut conn = Connection::connect(addr).await?;
    conn.handshake(&state, password).await?;
    info!(user = %state.username(), "Handshake sent");

    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

    let task = tokio::spawn(session_loop(conn, state, input_rx, event_tx));

    Ok(SessionHandle {
        input: input_tx,
        events: event_rx,
        task,
    })
}

async fn session_loop(
    mut conn: Connection,
    mut state: ClientState,
    mut input: mpsc::Receiver<String>,
    events: mpsc::Sender<ClientEvent>,
) -> Result<()> {
    let mut input_open = true;

    loop {
        tokio::select! {
            line = input.recv(), if input_open => match line {
                Some(line) => handle_input(&mut conn, &state, &events, line.trim()).await?,
                None => {
                    input_open = false;
                    conn.send_line(&Command::Quit.to_string()).await?;
                }
            },

            line = conn.next_line() => {
                let Some(line) = line? else {
                    debug!(user = %state.username(), "server closed the connection");
                    return Ok(());
                };
                let actions = match state.handle_line(&line) {
                    Ok(actions) => actions,
                    Err(e) => {
                        warn!(error = %e, "dropping server line");
                        continue;
                    }
                };
                for action in actions {
                    match action {
                        ClientAction::Send(reply) => conn.send_line(&reply).await?,
                        ClientAction::Notify(event) => notify(&events, event).await,
                    }
                }
            }
        }
    }
}

async fn handle_input(
    conn: &mut Connection,
    state: &ClientState,
    events: &mpsc::Sender<ClientEvent>,
    line: &str,
) -> Result<()> {
    if line.is_empty() {
        return Ok(());
    }
    if is_command(line) {
        return conn.send_line(line).await;
    }

    match state.outgoing_chat(line) {
        Ok(payload) => conn.send_line(&payload).await,
        Err(e) => {
            notify(events, ClientEvent::Info { text: e.to_string() }).await;
            Ok(())
        }
    }
}

async fn notify(events: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    if events.send(event).await.is_err() {
        debug!("event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use vanished_shared::keywrap::generate_private_key;

    #[tokio::test]
    async fn session_encrypts_chat_and_quits_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::from_stream(stream);
            let mut received = Vec::new();
            for _ in 0..3 {
                received.push(conn.next_line().await.unwrap().unwrap());
            }
            conn.send_line("SYSTEM_INFO:Room 'vault' created. You are the host.")
                .await
                .unwrap();
            for _ in 0..3 {
                received.push(conn.next_line().await.unwrap().unwrap());
            }
            received
        });

        let state = ClientState::new("alice", generate_private_key(1024).unwrap()).unwrap();
        let public_key = state.public_key().to_string();
        let mut session = spawn_session(addr, state, "password123").await.unwrap();

        assert_eq!(
            session.next_event().await,
            Some(ClientEvent::RoomCreated {
                room: "vault".into()
            })
        );
        session.send("/users").await.unwrap();
        session.send("attack at dawn").await.unwrap();

        // shutdown blocks until the server side hangs up
        let shutdown = tokio::spawn(session.shutdown());
        let received = server.await.unwrap();

        assert_eq!(received[..3], ["alice", "password123", public_key.as_str()]);
        assert_eq!(received[3], "/users");
        assert_ne!(received[4], "attack at dawn");
        assert!(!received[4].is_empty());
        assert_eq!(received[5], "/quit");

        shutdown.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn chat_without_room_key_is_reported_locally() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::from_stream(stream);
            let mut received = Vec::new();
            while let Ok(Some(line)) = conn.next_line().await {
                let quit = line == "/quit";
                received.push(line);
                if quit {
                    break;
                }
            }
            received
        });

        let state = ClientState::new("bob", generate_private_key(1024).unwrap()).unwrap();
        let mut session = spawn_session(addr, state, "password123").await.unwrap();

        session.send("hello?").await.unwrap();
        assert_eq!(
            session.next_event().await,
            Some(ClientEvent::Info {
                text: ClientError::NoRoomKey.to_string()
            })
        );

        let shutdown = tokio::spawn(session.shutdown());
        let received = server.await.unwrap();
        assert_eq!(received.len(), 4);
        assert_eq!(received[3], "/quit");
        shutdown.await.unwrap().unwrap();
    }
}
