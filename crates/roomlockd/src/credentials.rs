//! In-memory credential store.
//!
//! Accounts are keyed by case-folded user id, matching how the protocol
//! compares a command's user id with its session. The store is consulted
//! once per session, at login.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use roomlock_core::{ClientId, CredentialError, UserAccount, UserType};
use roomlock_protocol::SEPARATOR;

/// Registered user accounts.
#[derive(Debug, Default)]
pub struct CredentialStore {
    accounts: RwLock<HashMap<String, UserAccount>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// - `CredentialError::InvalidField` if the user id or password is
    ///   blank or contains the protocol separator
    /// - `CredentialError::DuplicateUser` if the user id is taken
    pub fn create_user(
        &self,
        user_id: &str,
        full_name: &str,
        user_type: UserType,
        password: &str,
    ) -> Result<(), CredentialError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CredentialError::invalid("user_id", "must not be empty"));
        }
        if user_id.contains(SEPARATOR) {
            return Err(CredentialError::invalid(
                "user_id",
                format!("must not contain '{SEPARATOR}'"),
            ));
        }
        if password.is_empty() {
            return Err(CredentialError::invalid("password", "must not be empty"));
        }
        // A LOGIN line could never carry it
        if password.contains(SEPARATOR) {
            return Err(CredentialError::invalid(
                "password",
                format!("must not contain '{SEPARATOR}'"),
            ));
        }

        let id = ClientId::new(user_id);
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&id.folded()) {
            warn!(user_id = %id, "Rejected duplicate user");
            return Err(CredentialError::DuplicateUser(user_id.to_string()));
        }

        accounts.insert(
            id.folded(),
            UserAccount::new(id.clone(), full_name.trim(), user_type, password),
        );
        info!(user_id = %id, user_type = %user_type, "User created");
        Ok(())
    }

    /// Checks a login attempt and returns the account's user type.
    ///
    /// # Errors
    ///
    /// - `CredentialError::UnknownUser` if no such account exists
    /// - `CredentialError::BadPassword` on credential mismatch
    pub fn validate_credentials(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<UserType, CredentialError> {
        let id = ClientId::new(user_id.trim());
        let accounts = self.accounts.read();

        let Some(account) = accounts.get(&id.folded()) else {
            debug!(user_id = %id, "Login for unknown user");
            return Err(CredentialError::UnknownUser(id.to_string()));
        };

        if !account.password_matches(password) {
            debug!(user_id = %id, "Login with bad password");
            return Err(CredentialError::BadPassword(id.to_string()));
        }

        Ok(account.user_type)
    }

    /// The account registered under `user_id`, if any.
    pub fn account(&self, user_id: &str) -> Option<UserAccount> {
        let key = ClientId::new(user_id.trim()).folded();
        self.accounts.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}
