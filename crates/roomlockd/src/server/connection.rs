//! Connection handler for individual client connections.
//!
//! Each TCP connection gets:
//! - a `ConnectionHandler` that reads lines, authenticates and dispatches
//!   commands to the lock manager
//! - a writer task that drains the connection's outbound channel to the
//!   socket, so replies and promotion pushes from other connections share
//!   one ordered stream
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use roomlock_core::{ClientId, DomainError, ResourceKey, RoomId, SlotId};
use roomlock_protocol::{
    parse_command, ClientCommand, ProtocolError, ServerMessage, MAX_LINE_LENGTH,
};

use super::ServerContext;
use crate::coordinator::{OutboundReceiver, OutboundSender};
use crate::session::{AuthError, ClientSession};

/// Write timeout used when none is configured (10 seconds)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// One read from the socket.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Text(String),
    /// Line exceeded `MAX_LINE_LENGTH`; its bytes were discarded.
    TooLong(usize),
    Eof,
}

/// Connection handler for a single client.
///
/// Holds the read half of the socket and the sending half of the
/// connection's outbound channel. Runs until EOF, an I/O error, or
/// cancellation, then releases everything the session held.
pub struct ConnectionHandler {
    /// Buffered reader for incoming lines
    reader: BufReader<OwnedReadHalf>,

    /// Outbound channel drained by this connection's writer task
    outbound: OutboundSender,

    /// Shared coordinator state
    context: ServerContext,

    /// Set by the first successful login
    session: Option<ClientSession>,

    /// Unique number for this connection
    connection_number: u64,

    /// Cancelled on server shutdown or writer failure
    cancel_token: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the TCP stream
    /// * `outbound` - Sender of the connection's outbound channel
    /// * `context` - Shared coordinator state
    /// * `connection_number` - Unique number for this connection
    /// * `cancel_token` - Token ending this connection
    pub fn new(
        reader: OwnedReadHalf,
        outbound: OutboundSender,
        context: ServerContext,
        connection_number: u64,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            outbound,
            context,
            session: None,
            connection_number,
            cancel_token,
        }
    }

    /// Runs the connection handler.
    ///
    /// Returns the session's client id, if the connection ever logged in,
    /// after its disconnect cleanup has completed.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "Processing connection");

        if let Err(e) = self.process_lines().await {
            debug!(
                connection = self.connection_number,
                error = %e,
                "Connection closed"
            );
        }

        self.disconnect()
    }

    /// Main read loop.
    async fn process_lines(&mut self) -> Result<(), ConnectionError> {
        let cancel_token = self.cancel_token.clone();
        loop {
            let line = tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!(connection = self.connection_number, "Connection cancelled");
                    return Ok(());
                }
                line = self.read_line() => line?,
            };

            match line {
                Line::Text(text) => self.handle_line(&text)?,
                Line::TooLong(size) => {
                    warn!(
                        connection = self.connection_number,
                        size,
                        "Discarded oversized line"
                    );
                    let err = ProtocolError::LineTooLong {
                        size,
                        max: MAX_LINE_LENGTH,
                    };
                    self.send(err.reply())?;
                }
                Line::Eof => {
                    debug!(connection = self.connection_number, "Client sent EOF");
                    return Ok(());
                }
            }
        }
    }

    /// Parses and executes one line.
    fn handle_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(e) => {
                debug!(connection = self.connection_number, error = %e, "Protocol error");
                return self.send(e.reply());
            }
        };

        debug!(
            connection = self.connection_number,
            command = %command.kind(),
            user_id = command.user_id(),
            "Received command"
        );

        let reply = match command {
            ClientCommand::Login { user_id, password } => Some(self.handle_login(&user_id, &password)),
            ClientCommand::Request {
                user_id,
                room,
                slot,
            } => self.handle_request(&user_id, room, slot),
            ClientCommand::Release {
                user_id,
                room,
                slot,
            } => Some(self.handle_release(&user_id, room, slot)),
        };

        match reply {
            Some(msg) => self.send(msg),
            None => Ok(()),
        }
    }

    fn handle_login(&mut self, user_id: &str, password: &str) -> ServerMessage {
        let user_type = match self.context.credentials.validate_credentials(user_id, password) {
            Ok(user_type) => user_type,
            Err(e) => {
                info!(connection = self.connection_number, error = %e, "Login failed");
                return ServerMessage::login_fail(e.code());
            }
        };

        if let Some(session) = &self.session {
            if session.acts_for(user_id) {
                return ServerMessage::login_ok(session.user_type);
            }
            let err = AuthError::AlreadyAuthenticated(session.client_id.clone());
            info!(connection = self.connection_number, error = %err, "Login refused");
            return ServerMessage::login_fail(err.code());
        }

        let client_id = ClientId::new(user_id.trim());
        if let Err(err) = self.context.sessions.claim(&client_id, self.connection_number) {
            info!(connection = self.connection_number, error = %err, "Login refused");
            return ServerMessage::login_fail(err.code());
        }

        info!(
            client_id = %client_id,
            user_type = %user_type,
            connection = self.connection_number,
            "Client logged in"
        );
        self.session = Some(ClientSession {
            client_id,
            user_type,
            connection: self.connection_number,
        });
        ServerMessage::login_ok(user_type)
    }

    /// Handles `REQUEST`. The outcome reply is enqueued by the lock manager,
    /// so only errors are returned here.
    fn handle_request(&self, user_id: &str, room: RoomId, slot: SlotId) -> Option<ServerMessage> {
        let client_id = match self.authorize(user_id) {
            Ok(id) => id,
            Err(err) => return Some(ServerMessage::error(err.code())),
        };

        let key = ResourceKey::new(self.context.manager.current_date(), room, slot);
        match self.context.manager.request(client_id, &key, &self.outbound) {
            Ok(_) => None,
            Err(err) => Some(self.domain_error(client_id, err)),
        }
    }

    fn handle_release(&self, user_id: &str, room: RoomId, slot: SlotId) -> ServerMessage {
        let client_id = match self.authorize(user_id) {
            Ok(id) => id,
            Err(err) => return ServerMessage::error(err.code()),
        };

        let key = ResourceKey::new(self.context.manager.current_date(), room, slot);
        match self.context.manager.release(client_id, &key) {
            Ok(_) => ServerMessage::released(key.room, key.slot),
            Err(err) => self.domain_error(client_id, err),
        }
    }

    /// Checks that the connection is logged in as `user_id`.
    fn authorize(&self, user_id: &str) -> Result<&ClientId, AuthError> {
        let session = self.session.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if !session.acts_for(user_id) {
            return Err(AuthError::UserMismatch {
                command: user_id.to_string(),
                session: session.client_id.clone(),
            });
        }
        Ok(&session.client_id)
    }

    fn domain_error(&self, client_id: &ClientId, err: DomainError) -> ServerMessage {
        debug!(
            client_id = %client_id,
            connection = self.connection_number,
            error = %err,
            "Command rejected"
        );
        ServerMessage::error(err.code())
    }

    /// Releases the session's cells and queue entries, then its client id.
    fn disconnect(&mut self) -> Option<ClientId> {
        let session = self.session.take()?;
        let report = self.context.manager.handle_disconnect(&session.client_id);
        self.context
            .sessions
            .release(&session.client_id, self.connection_number);

        info!(
            client_id = %session.client_id,
            connection = self.connection_number,
            released = report.released,
            dequeued = report.dequeued,
            "Client disconnected"
        );
        Some(session.client_id)
    }

    /// Reads one line of at most `MAX_LINE_LENGTH` bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    async fn read_line(&mut self) -> Result<Line, ConnectionError> {
        let mut buf = Vec::new();
        // Room for the longest accepted line plus "\r\n"
        let limit = (MAX_LINE_LENGTH + 2) as u64;
        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Ok(Line::Eof);
        }

        if buf.last() != Some(&b'\n') && buf.len() as u64 == limit {
            let rest = self.discard_line().await?;
            return Ok(Line::TooLong(buf.len() + rest));
        }

        Ok(Line::Text(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Skips input up to and including the next newline.
    async fn discard_line(&mut self) -> Result<usize, ConnectionError> {
        let mut discarded = 0;
        loop {
            let available = self
                .reader
                .fill_buf()
                .await
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            let len = available.len();
            if len == 0 {
                return Ok(discarded);
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(index) => {
                    self.reader.consume(index + 1);
                    return Ok(discarded + index + 1);
                }
                None => {
                    self.reader.consume(len);
                    discarded += len;
                }
            }
        }
    }

    /// Enqueues a message for the writer task.
    fn send(&self, msg: ServerMessage) -> Result<(), ConnectionError> {
        self.outbound
            .send(msg)
            .map_err(|_| ConnectionError::WriterClosed)
    }
}

/// Spawns the task that writes a connection's outbound messages.
///
/// The task ends when every sender is gone or `cancel_token` fires. A
/// failed or stalled write cancels `cancel_token`, which ends the reader
/// side of the same connection.
pub fn spawn_writer(
    writer: OwnedWriteHalf,
    mut outbound: OutboundReceiver,
    write_timeout: Duration,
    connection_number: u64,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);
        loop {
            let msg = tokio::select! {
                _ = cancel_token.cancelled() => break,
                msg = outbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            if let Err(e) = write_message(&mut writer, &msg, write_timeout).await {
                warn!(
                    connection = connection_number,
                    message = %msg,
                    error = %e,
                    "Failed to write message"
                );
                cancel_token.cancel();
                break;
            }
        }
        debug!(connection = connection_number, "Writer finished");
    })
}

/// Writes one line and flushes it, bounded by `write_timeout`.
async fn write_message(
    writer: &mut BufWriter<OwnedWriteHalf>,
    msg: &ServerMessage,
    write_timeout: Duration,
) -> Result<(), ConnectionError> {
    let line = format!("{msg}\n");
    match timeout(write_timeout, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Writer task closed")]
    WriterClosed,
}
