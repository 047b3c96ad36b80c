//! Username/password verification against the login table

use std::sync::Arc;
use tracing::debug;

use super::auth::PasswordHashing;
use super::store::DataStore;
use crate::error::StoreError;

pub struct CredentialValidator {
    store: Arc<dyn DataStore>,
    hashing: PasswordHashing,
}

impl CredentialValidator {
    pub fn new(store: Arc<dyn DataStore>, hashing: PasswordHashing) -> Self {
        Self { store, hashing }
    }

    /// True iff an authenticatable account (not a system account, level >= 0)
    /// matches both username and password. Unknown user, wrong password and
    /// filtered accounts are all `Ok(false)`; `Err` is reserved for store faults.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Ok(false);
        }

        let verified = match self
            .store
            .find_by_username(username)?
            .filter(|account| account.is_authenticatable())
        {
            Some(account) => self.hashing.matches(&account.password_credential, password),
            // Unknown names do the same hashing work as wrong passwords
            None => self.hashing.matches_missing(password),
        };

        debug!(username, verified, "credential check");
        Ok(verified)
    }
}
