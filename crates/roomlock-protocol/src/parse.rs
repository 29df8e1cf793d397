//! Line parsing for both directions of the protocol.
//!
//! Client lines are parsed leniently the way clients have always been
//! served: surrounding whitespace is dropped, blank lines are skipped, and
//! the command word is case-insensitive. Field values are taken verbatim.

use roomlock_core::{RoomId, SlotId, UserType};
use thiserror::Error;

use crate::message::{ClientCommand, CommandKind, ServerMessage};
use crate::SEPARATOR;

/// Longest accepted line in bytes, excluding the newline.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Errors for lines that do not follow the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} expects {expected} fields, got {got}")]
    InvalidFormat {
        command: CommandKind,
        expected: usize,
        got: usize,
    },

    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    #[error("malformed server line: {0}")]
    MalformedReply(String),
}

impl ProtocolError {
    /// The reply sent back on the offending connection.
    ///
    /// A badly formed `LOGIN` is answered as a login failure so clients
    /// waiting on the login outcome always see one.
    pub fn reply(&self) -> ServerMessage {
        match self {
            Self::InvalidFormat {
                command: CommandKind::Login,
                ..
            } => ServerMessage::login_fail("Invalid format"),
            Self::InvalidFormat { command, .. } => {
                ServerMessage::error(&format!("Invalid {command} format"))
            }
            Self::UnknownCommand(_) => ServerMessage::error("Unknown command"),
            Self::LineTooLong { .. } => ServerMessage::error("Line too long"),
            Self::MalformedReply(_) => ServerMessage::error("Malformed line"),
        }
    }
}

/// Parses one client line.
///
/// Returns `Ok(None)` for blank lines, which are ignored.
pub fn parse_command(line: &str) -> Result<Option<ClientCommand>, ProtocolError> {
    let content = line.trim_end_matches(&['\r', '\n'][..]);
    if content.len() > MAX_LINE_LENGTH {
        return Err(ProtocolError::LineTooLong {
            size: content.len(),
            max: MAX_LINE_LENGTH,
        });
    }

    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split(SEPARATOR).collect();
    let word = parts.first().copied().unwrap_or_default();

    let kind = match word.to_uppercase().as_str() {
        "LOGIN" => CommandKind::Login,
        "REQUEST" => CommandKind::Request,
        "RELEASE" => CommandKind::Release,
        _ => return Err(ProtocolError::UnknownCommand(word.to_string())),
    };

    if parts.len() != kind.field_count() {
        return Err(ProtocolError::InvalidFormat {
            command: kind,
            expected: kind.field_count(),
            got: parts.len(),
        });
    }

    let field = |i: usize| parts.get(i).copied().unwrap_or_default();

    let command = match kind {
        CommandKind::Login => ClientCommand::Login {
            user_id: field(1).to_string(),
            password: field(2).to_string(),
        },
        CommandKind::Request => ClientCommand::Request {
            user_id: field(1).to_string(),
            room: RoomId::new(field(2)),
            slot: SlotId::new(field(3)),
        },
        CommandKind::Release => ClientCommand::Release {
            user_id: field(1).to_string(),
            room: RoomId::new(field(2)),
            slot: SlotId::new(field(3)),
        },
    };

    Ok(Some(command))
}

/// Parses one server line, as a client would.
pub fn parse_server_line(line: &str) -> Result<ServerMessage, ProtocolError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let malformed = || ProtocolError::MalformedReply(line.to_string());

    let mut parts = line.splitn(3, SEPARATOR);
    if parts.next() != Some("INFO") {
        return Err(malformed());
    }
    let kind = parts.next().ok_or_else(malformed)?;
    let rest = parts.next().unwrap_or_default();

    let room_slot = |rest: &str| -> Result<(RoomId, SlotId), ProtocolError> {
        let mut fields = rest.split(SEPARATOR);
        match (fields.next(), fields.next(), fields.next()) {
            (Some(room), Some(slot), None) => Ok((RoomId::new(room), SlotId::new(slot))),
            _ => Err(malformed()),
        }
    };

    match kind {
        "LOGIN_OK" => rest
            .parse::<UserType>()
            .map(ServerMessage::login_ok)
            .map_err(|_| malformed()),
        "LOGIN_FAIL" => Ok(ServerMessage::login_fail(rest)),
        "ERROR" => Ok(ServerMessage::error(rest)),
        "GRANTED" => {
            let (room, slot) = room_slot(rest)?;
            Ok(ServerMessage::granted(room, slot))
        }
        "RELEASED" => {
            let (room, slot) = room_slot(rest)?;
            Ok(ServerMessage::released(room, slot))
        }
        "QUEUED" => {
            let (head, position) = rest.rsplit_once(SEPARATOR).ok_or_else(malformed)?;
            let position = position.parse::<usize>().map_err(|_| malformed())?;
            let (room, slot) = room_slot(head)?;
            Ok(ServerMessage::queued(room, slot, position))
        }
        _ => Err(malformed()),
    }
}
