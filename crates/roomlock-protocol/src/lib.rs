//! roomlock protocol - text line protocol between clients and the coordinator
//!
//! One command per line, UTF-8, fields separated by `|`:
//!
//! ```text
//! client → server   LOGIN|<userId>|<password>
//!                   REQUEST|<userId>|<roomId>|<slotId>
//!                   RELEASE|<userId>|<roomId>|<slotId>
//! server → client   INFO|LOGIN_OK|<userType>
//!                   INFO|LOGIN_FAIL|<reason>
//!                   INFO|ERROR|<reason>
//!                   INFO|GRANTED|<roomId>|<slotId>          (reply or push)
//!                   INFO|QUEUED|<roomId>|<slotId>|<position>
//!                   INFO|RELEASED|<roomId>|<slotId>
//! ```

pub mod message;
pub mod parse;

pub use message::{ClientCommand, CommandKind, ServerMessage};
pub use parse::{parse_command, parse_server_line, ProtocolError, MAX_LINE_LENGTH};

/// Field separator on the wire.
pub const SEPARATOR: char = '|';
