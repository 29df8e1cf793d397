//! Domain-specific error types following panic-free policy.
//!
//! Every variant that reaches a client carries a stable wire code via
//! `code()`; the `Display` text is for logs only.

use crate::{ClientId, ResourceKey};
use thiserror::Error;

/// Errors returned by lock/queue operations on a resource cell.
///
/// A `DomainError` always means the cell was left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The requester already owns the cell
    #[error("{client_id} already owns {key}")]
    AlreadyOwned { client_id: ClientId, key: ResourceKey },

    /// The requester is already waiting in the cell's queue
    #[error("{client_id} is already queued for {key}")]
    AlreadyQueued { client_id: ClientId, key: ResourceKey },

    /// Release attempted by a client that does not own the cell
    #[error("{client_id} does not own {key}")]
    NotOwner { client_id: ClientId, key: ResourceKey },

    /// Room or slot is not part of the configured catalog
    #[error("unknown resource: {room}/{slot}")]
    UnknownResource { room: String, slot: String },
}

impl DomainError {
    /// Wire code sent back as `INFO|ERROR|<code>`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyOwned { .. } => "ALREADY_OWNED",
            Self::AlreadyQueued { .. } => "ALREADY_QUEUED",
            Self::NotOwner { .. } => "NOT_OWNER",
            Self::UnknownResource { .. } => "UNKNOWN_RESOURCE",
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors from account creation and credential validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// An account with this user id is already registered
    #[error("user already exists: {0}")]
    DuplicateUser(String),

    /// A required field was empty or malformed
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// No account with this user id
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Password did not match the stored credential
    #[error("bad password for user: {0}")]
    BadPassword(String),
}

impl CredentialError {
    /// Wire code sent back as `INFO|LOGIN_FAIL|<code>`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateUser(_) => "DUPLICATE_USER",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::UnknownUser(_) => "UNKNOWN_USER",
            Self::BadPassword(_) => "BAD_PASSWORD",
        }
    }

    /// Creates an invalid-field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
