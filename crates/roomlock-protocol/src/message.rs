//! Protocol message types for coordinator communication.

use roomlock_core::{RoomId, SlotId, UserType};
use std::fmt;

/// Command word of a client line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Login,
    Request,
    Release,
}

impl CommandKind {
    /// Number of `|`-separated fields a well-formed line carries.
    pub fn field_count(&self) -> usize {
        match self {
            Self::Login => 3,
            Self::Request | Self::Release => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Request => "REQUEST",
            Self::Release => "RELEASE",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands sent by clients to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Authenticate this connection
    Login { user_id: String, password: String },

    /// Ask for exclusive access to a cell of the current date
    Request {
        user_id: String,
        room: RoomId,
        slot: SlotId,
    },

    /// Give up a held cell
    Release {
        user_id: String,
        room: RoomId,
        slot: SlotId,
    },
}

impl ClientCommand {
    /// Creates a login command.
    pub fn login(user_id: &str, password: &str) -> Self {
        Self::Login {
            user_id: user_id.to_string(),
            password: password.to_string(),
        }
    }

    /// Creates a request command.
    pub fn request(user_id: &str, room: &str, slot: &str) -> Self {
        Self::Request {
            user_id: user_id.to_string(),
            room: RoomId::new(room),
            slot: SlotId::new(slot),
        }
    }

    /// Creates a release command.
    pub fn release(user_id: &str, room: &str, slot: &str) -> Self {
        Self::Release {
            user_id: user_id.to_string(),
            room: RoomId::new(room),
            slot: SlotId::new(slot),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Login { .. } => CommandKind::Login,
            Self::Request { .. } => CommandKind::Request,
            Self::Release { .. } => CommandKind::Release,
        }
    }

    /// The user id the command claims to act for.
    pub fn user_id(&self) -> &str {
        match self {
            Self::Login { user_id, .. }
            | Self::Request { user_id, .. }
            | Self::Release { user_id, .. } => user_id,
        }
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { user_id, password } => write!(f, "LOGIN|{user_id}|{password}"),
            Self::Request {
                user_id,
                room,
                slot,
            } => write!(f, "REQUEST|{user_id}|{room}|{slot}"),
            Self::Release {
                user_id,
                room,
                slot,
            } => write!(f, "RELEASE|{user_id}|{room}|{slot}"),
        }
    }
}

/// Messages sent from the coordinator to clients.
///
/// `Display` renders the wire line without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Login accepted
    LoginOk { user_type: UserType },

    /// Login rejected
    LoginFail { reason: String },

    /// Any other rejected line
    Error { reason: String },

    /// Exclusive access granted, either as a reply or as a promotion push
    Granted { room: RoomId, slot: SlotId },

    /// Cell is held by someone else; 1-based position in its wait queue
    Queued {
        room: RoomId,
        slot: SlotId,
        position: usize,
    },

    /// Held cell was given up
    Released { room: RoomId, slot: SlotId },
}

impl ServerMessage {
    /// Creates a login accepted response.
    pub fn login_ok(user_type: UserType) -> Self {
        Self::LoginOk { user_type }
    }

    /// Creates a login rejected response.
    pub fn login_fail(reason: &str) -> Self {
        Self::LoginFail {
            reason: reason.to_string(),
        }
    }

    /// Creates an error response.
    pub fn error(reason: &str) -> Self {
        Self::Error {
            reason: reason.to_string(),
        }
    }

    /// Creates a grant message.
    pub fn granted(room: RoomId, slot: SlotId) -> Self {
        Self::Granted { room, slot }
    }

    /// Creates a queued response.
    pub fn queued(room: RoomId, slot: SlotId, position: usize) -> Self {
        Self::Queued {
            room,
            slot,
            position,
        }
    }

    /// Creates a released response.
    pub fn released(room: RoomId, slot: SlotId) -> Self {
        Self::Released { room, slot }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoginOk { user_type } => write!(f, "INFO|LOGIN_OK|{user_type}"),
            Self::LoginFail { reason } => write!(f, "INFO|LOGIN_FAIL|{reason}"),
            Self::Error { reason } => write!(f, "INFO|ERROR|{reason}"),
            Self::Granted { room, slot } => write!(f, "INFO|GRANTED|{room}|{slot}"),
            Self::Queued {
                room,
                slot,
                position,
            } => write!(f, "INFO|QUEUED|{room}|{slot}|{position}"),
            Self::Released { room, slot } => write!(f, "INFO|RELEASED|{room}|{slot}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_lines() {
        assert_eq!(
            ServerMessage::login_ok(UserType::Lecturer).to_string(),
            "INFO|LOGIN_OK|Lecturer"
        );
        assert_eq!(
            ServerMessage::error("NOT_AUTHENTICATED").to_string(),
            "INFO|ERROR|NOT_AUTHENTICATED"
        );
        assert_eq!(
            ServerMessage::granted(RoomId::new("R1"), SlotId::new("S1")).to_string(),
            "INFO|GRANTED|R1|S1"
        );
        assert_eq!(
            ServerMessage::queued(RoomId::new("R1"), SlotId::new("S2"), 3).to_string(),
            "INFO|QUEUED|R1|S2|3"
        );
    }

    #[test]
    fn test_client_command_lines() {
        assert_eq!(ClientCommand::login("u1", "pw").to_string(), "LOGIN|u1|pw");
        assert_eq!(
            ClientCommand::release("u1", "R2", "S4").to_string(),
            "RELEASE|u1|R2|S4"
        );
    }

    #[test]
    fn test_command_user_id_and_kind() {
        let cmd = ClientCommand::request("Bob", "R1", "S1");
        assert_eq!(cmd.user_id(), "Bob");
        assert_eq!(cmd.kind(), CommandKind::Request);
        assert_eq!(cmd.kind().field_count(), 4);
    }
}
