//! Client sessions and the live-session table.
//!
//! A connection becomes a session on its first successful `LOGIN`. The
//! table guarantees one live connection per client id: a second connection
//! logging in as the same user is refused until the first one has closed
//! and finished its disconnect cleanup.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use roomlock_core::{ClientId, UserType};

/// Identity of an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub client_id: ClientId,
    pub user_type: UserType,

    /// Server-assigned connection number
    pub connection: u64,
}

impl ClientSession {
    /// True if `user_id` names this session's client, ignoring case and
    /// surrounding whitespace as `LOGIN` does.
    pub fn acts_for(&self, user_id: &str) -> bool {
        self.client_id.matches(user_id.trim())
    }
}

/// Authentication failures answered on the offending connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("command before login")]
    NotAuthenticated,

    #[error("command user {command} does not match session user {session}")]
    UserMismatch { command: String, session: ClientId },

    #[error("user {0} already has a live session")]
    AlreadyConnected(ClientId),

    #[error("connection already logged in as {0}")]
    AlreadyAuthenticated(ClientId),
}

impl AuthError {
    /// Wire code sent back to the client.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::UserMismatch { .. } => "USER_MISMATCH",
            Self::AlreadyConnected(_) => "ALREADY_CONNECTED",
            Self::AlreadyAuthenticated(_) => "ALREADY_AUTHENTICATED",
        }
    }
}

/// Which connection currently holds each client id.
#[derive(Debug, Default)]
pub struct SessionTable {
    live: DashMap<String, u64>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `client_id` to `connection`.
    ///
    /// Claiming an id already held by the same connection succeeds.
    ///
    /// # Errors
    ///
    /// - `AuthError::AlreadyConnected` if another connection holds the id
    pub fn claim(&self, client_id: &ClientId, connection: u64) -> Result<(), AuthError> {
        match self.live.entry(client_id.folded()) {
            Entry::Occupied(entry) if *entry.get() == connection => Ok(()),
            Entry::Occupied(_) => Err(AuthError::AlreadyConnected(client_id.clone())),
            Entry::Vacant(entry) => {
                entry.insert(connection);
                debug!(client_id = %client_id, connection, "Session claimed");
                Ok(())
            }
        }
    }

    /// Frees `client_id` if `connection` still holds it.
    pub fn release(&self, client_id: &ClientId, connection: u64) -> bool {
        let removed = self
            .live
            .remove_if(&client_id.folded(), |_, holder| *holder == connection)
            .is_some();
        if removed {
            debug!(client_id = %client_id, connection, "Session released");
        }
        removed
    }

    /// Connection currently holding `client_id`, if any.
    pub fn holder(&self, client_id: &ClientId) -> Option<u64> {
        self.live.get(&client_id.folded()).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
