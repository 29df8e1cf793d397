//! Daemon configuration.
//!
//! Loaded from a TOML file whose every field is optional, then overridden
//! from the environment:
//!
//! ```toml
//! listen = "0.0.0.0:5000"
//! rooms = ["R1", "R2", "R3"]
//! slots = ["S1", "S2", "S3", "S4"]
//! date = "2025-03-14"        # defaults to today
//! write_timeout_secs = 10
//!
//! [[users]]
//! user_id = "u1"
//! full_name = "First User"
//! user_type = "Student"      # Student | Lecturer | Staff
//! password = "secret"
//! ```

use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use roomlock_core::{Catalog, CatalogError, CredentialError, RoomId, SlotId, UserType};

use crate::credentials::CredentialStore;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ROOMLOCK_CONFIG";

/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "ROOMLOCK_LISTEN";

/// Default TCP listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:5000";

const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Errors raised while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid listen address {addr:?}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("invalid catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("write_timeout_secs must be positive")]
    WriteTimeout,

    #[error("invalid seed user {user_id:?}: {source}")]
    SeedUser {
        user_id: String,
        #[source]
        source: CredentialError,
    },
}

/// An account created at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub user_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub user_type: UserType,
    pub password: String,
}

/// Full daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: String,
    pub rooms: Vec<String>,
    pub slots: Vec<String>,
    pub date: Option<NaiveDate>,
    pub write_timeout_secs: u64,
    pub users: Vec<SeedUser>,
}

impl Default for Config {
    fn default() -> Self {
        let catalog = Catalog::default();
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            rooms: catalog.rooms().iter().map(|r| r.to_string()).collect(),
            slots: catalog.slots().iter().map(|s| s.to_string()).collect(),
            date: None,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            users: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration for the daemon.
    ///
    /// Uses `path` if given, else `$ROOMLOCK_CONFIG` if set, else built-in
    /// defaults. `$ROOMLOCK_LISTEN` then overrides the listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the result
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };

        let config = config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses one TOML file. Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(LISTEN_ENV).filter(|v| !v.trim().is_empty()) {
            Some(listen) => Self {
                listen: listen.trim().to_string(),
                ..self
            },
            None => self,
        }
    }

    /// Checks every field that can be checked without side effects.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.catalog()?;
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::WriteTimeout);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|source| ConfigError::Listen {
            addr: self.listen.clone(),
            source,
        })
    }

    /// The room/slot catalog, in configured order.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        let rooms = self.rooms.iter().map(|r| RoomId::new(r.trim())).collect();
        let slots = self.slots.iter().map(|s| SlotId::new(s.trim())).collect();
        Ok(Catalog::new(rooms, slots)?)
    }

    /// Configured start date, or `today` if unset.
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        self.date.unwrap_or(today)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Creates every seed account. Stops at the first invalid one.
    pub fn seed_users(&self, store: &CredentialStore) -> Result<usize, ConfigError> {
        for user in &self.users {
            store
                .create_user(&user.user_id, &user.full_name, user.user_type, &user.password)
                .map_err(|source| ConfigError::SeedUser {
                    user_id: user.user_id.clone(),
                    source,
                })?;
        }
        Ok(self.users.len())
    }
}
