//! User accounts and client identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an authenticated client.
///
/// Equal to the account's user id; one live connection per id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison used to check command user ids
    /// against the session's identity.
    pub fn matches(&self, other: &str) -> bool {
        self.0.to_lowercase() == other.to_lowercase()
    }

    /// Normalized form used as a lookup key for live sessions.
    pub fn folded(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Category of an account. Informational only: never affects scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UserType {
    #[default]
    Student,
    Lecturer,
    Staff,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Lecturer => "Lecturer",
            Self::Staff => "Staff",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown user type: {0}")]
pub struct UserTypeParseError(pub String);

impl FromStr for UserType {
    type Err = UserTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "lecturer" => Ok(Self::Lecturer),
            "staff" => Ok(Self::Staff),
            _ => Err(UserTypeParseError(s.to_string())),
        }
    }
}

/// A registered account.
///
/// The credential is stored and compared as given. Hardening it (salted
/// hashing) would not change the wire contract.
#[derive(Clone)]
pub struct UserAccount {
    pub user_id: ClientId,
    pub full_name: String,
    pub user_type: UserType,
    password: String,
}

impl UserAccount {
    pub fn new(
        user_id: impl Into<ClientId>,
        full_name: impl Into<String>,
        user_type: UserType,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            full_name: full_name.into(),
            user_type,
            password: password.into(),
        }
    }

    /// Direct equality check against the stored credential.
    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}

impl fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAccount")
            .field("user_id", &self.user_id)
            .field("full_name", &self.full_name)
            .field("user_type", &self.user_type)
            .field("password", &"<redacted>")
            .finish()
    }
}
