//! Account creation and password verification.

use chrono::Utc;
use parley_shared::crypto::PasswordHash;
use parley_store::UserRecord;
use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::hub::{Directory, UserEntry};

impl Directory {
    /// Create a new account. Username and display name are trimmed; all
    /// three fields must be non-empty.
    pub fn register_account(
        &mut self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> ChatResult<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ChatError::InvalidRequest("username must not be empty".into()));
        }
        if password.trim().is_empty() {
            return Err(ChatError::InvalidRequest("password must not be empty".into()));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ChatError::InvalidRequest("display name must not be empty".into()));
        }
        if self.users.contains_key(username) {
            return Err(ChatError::DuplicateUsername);
        }

        let credential = PasswordHash::create(password);
        let record = UserRecord {
            username: username.to_string(),
            display_name: display_name.to_string(),
            password_salt: credential.salt_hex(),
            password_hash: credential.hash_hex(),
            created_at: Utc::now(),
        };

        self.gateway().create_user(&record)?;
        self.users.insert(
            username.to_string(),
            UserEntry::new(username.to_string(), display_name.to_string(), credential),
        );
        info!(username, "Registered account");
        Ok(())
    }

    /// Check a username/password pair. Both an unknown user and a wrong
    /// password yield the same [`ChatError::InvalidCredentials`].
    pub fn verify_credentials(&self, username: &str, password: &str) -> ChatResult<&UserEntry> {
        let username = username.trim();
        match self.users.get(username) {
            Some(user) if user.credential.verify(password) => Ok(user),
            Some(_) => {
                debug!(username, "Password mismatch");
                Err(ChatError::InvalidCredentials)
            }
            None => {
                debug!(username, "Login for unknown user");
                Err(ChatError::InvalidCredentials)
            }
        }
    }
}
