//! Client command grammar.
//!
//! A command line is parsed once into [`Command`]; handlers then match on
//! the variant. Flags are whitespace-separated tokens followed by their
//! value.

use std::fmt;

use crate::constants::{COMMAND_SIGIL, MIN_ROOM_PASSWORD_LEN};
use crate::error::ProtocolError;
use crate::types::Visibility;

const CREATE_USAGE: &str =
    "/create -n <name> (--public | --private -p <password>) [-m <max_users>]";
const JOIN_USAGE: &str = "/join -n <name> [-p <password>]";
const SEND_KEY_USAGE: &str = "/sendKey <username> <base64-blob>";

/// Lines returned by `/help`. `/sendKey` is client-internal and not listed.
pub const HELP_LINES: &[&str] = &[
    "Available commands:",
    "  /create -n <name> --public                -> Create a public room and join it as host",
    "  /create -n <name> --private -p <password> -> Create a password-protected room",
    "          [-m <max_users>]                   -> Optional room capacity",
    "  /join -n <name> [-p <password>]           -> Join a room",
    "  /rooms                                    -> List public rooms",
    "  /users                                    -> List users in your room",
    "  /leave-room                               -> Leave your room",
    "  /help                                     -> Show this message",
    "  /quit                                     -> Disconnect and erase your user",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        name: String,
        visibility: Visibility,
        max_users: Option<u32>,
    },
    Join {
        name: String,
        password: Option<String>,
    },
    Users,
    Rooms,
    LeaveRoom,
    SendKey {
        target: String,
        wrapped_key: String,
    },
    Help,
    Quit,
}

/// True if `line` should go to the command parser rather than be relayed.
pub fn is_command(line: &str) -> bool {
    line.starts_with(COMMAND_SIGIL)
}

/// Return the token following `flag`, or an empty string when the flag is
/// absent or is the last token.
pub fn extract_flag<'a>(line: &'a str, flag: &str) -> &'a str {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parts
        .iter()
        .position(|part| *part == flag)
        .and_then(|idx| parts.get(idx + 1))
        .copied()
        .unwrap_or("")
}

/// Value of a `-n`/`-p` style flag. A missing value, or a token starting
/// with `-` (the next flag), is a usage error.
fn flag_value<'a>(line: &'a str, flag: &str, usage: &'static str) -> Result<&'a str, ProtocolError> {
    match extract_flag(line, flag) {
        value if value.is_empty() || value.starts_with('-') => Err(ProtocolError::Usage(usage)),
        value => Ok(value),
    }
}

fn has_flag(line: &str, flag: &str) -> bool {
    line.split_whitespace().any(|part| part == flag)
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        let head = parts.next().unwrap_or_default();

        match head {
            "/create" => parse_create(line),
            "/join" => {
                let name = flag_value(line, "-n", JOIN_USAGE)?;
                let password = if has_flag(line, "-p") {
                    Some(flag_value(line, "-p", JOIN_USAGE)?.to_string())
                } else {
                    None
                };
                Ok(Command::Join {
                    name: name.to_string(),
                    password,
                })
            }
            "/users" => Ok(Command::Users),
            "/rooms" => Ok(Command::Rooms),
            "/leave-room" => Ok(Command::LeaveRoom),
            "/sendKey" => match (parts.next(), parts.next()) {
                (Some(target), Some(blob)) => Ok(Command::SendKey {
                    target: target.to_string(),
                    wrapped_key: blob.to_string(),
                }),
                _ => Err(ProtocolError::Usage(SEND_KEY_USAGE)),
            },
            "/help" => Ok(Command::Help),
            "/quit" => Ok(Command::Quit),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_create(line: &str) -> Result<Command, ProtocolError> {
    let name = flag_value(line, "-n", CREATE_USAGE)?;

    let visibility = match (has_flag(line, "--public"), has_flag(line, "--private")) {
        (true, false) => Visibility::Public,
        (false, true) => {
            let password = flag_value(line, "-p", CREATE_USAGE)?;
            if password.chars().count() < MIN_ROOM_PASSWORD_LEN {
                return Err(ProtocolError::PasswordTooShort {
                    min: MIN_ROOM_PASSWORD_LEN,
                });
            }
            Visibility::Private {
                password: password.to_string(),
            }
        }
        _ => return Err(ProtocolError::AmbiguousVisibility),
    };

    let max_users = match extract_flag(line, "-m") {
        "" if has_flag(line, "-m") => {
            return Err(ProtocolError::InvalidCapacity("missing value".to_string()))
        }
        "" => None,
        raw => Some(
            raw.parse::<u32>()
                .map_err(|_| ProtocolError::InvalidCapacity(raw.to_string()))?,
        ),
    };

    Ok(Command::Create {
        name: name.to_string(),
        visibility,
        max_users,
    })
}

/// Renders the line a client sends for this command.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create {
                name,
                visibility,
                max_users,
            } => {
                write!(f, "/create -n {name}")?;
                match visibility {
                    Visibility::Public => write!(f, " --public")?,
                    Visibility::Private { password } => write!(f, " --private -p {password}")?,
                }
                if let Some(max) = max_users {
                    write!(f, " -m {max}")?;
                }
                Ok(())
            }
            Command::Join { name, password } => match password {
                Some(password) => write!(f, "/join -n {name} -p {password}"),
                None => write!(f, "/join -n {name}"),
            },
            Command::Users => f.write_str("/users"),
            Command::Rooms => f.write_str("/rooms"),
            Command::LeaveRoom => f.write_str("/leave-room"),
            Command::SendKey {
                target,
                wrapped_key,
            } => write!(f, "/sendKey {target} {wrapped_key}"),
            Command::Help => f.write_str("/help"),
            Command::Quit => f.write_str("/quit"),
        }
    }
}
