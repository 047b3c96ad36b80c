//! Credential transforms applied to passwords before storage or comparison

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DUMMY_PASSWORD: &str = "login_gateway.no_such_account";

lazy_static! {
    // Stand-in credential verified for usernames with no admissible row
    static ref DUMMY_HASH: Option<String> = hash_password(DUMMY_PASSWORD).ok();
}

#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Password hashing failed: {0}")]
    HashFailed(String),
}

/// How passwords are stored. One mode applies to every account; there is no
/// per-account override, so switching modes strands existing credentials.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PasswordHashing {
    /// Stored verbatim. Legacy game-server compatibility only.
    Plaintext,
    /// Unsalted lowercase-hex MD5. Legacy compatibility only.
    Md5,
    /// Argon2id PHC string with a per-account random salt
    #[default]
    Argon2,
}

impl PasswordHashing {
    pub fn uses_weak_digest(&self) -> bool {
        matches!(self, PasswordHashing::Md5)
    }

    /// Transform a plaintext password into its stored form
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        match self {
            PasswordHashing::Plaintext => Ok(password.to_string()),
            PasswordHashing::Md5 => Ok(md5_hex(password)),
            PasswordHashing::Argon2 => hash_password(password),
        }
    }

    /// Check a supplied password against a stored credential
    pub fn matches(&self, stored: &str, supplied: &str) -> bool {
        match self {
            PasswordHashing::Plaintext => stored == supplied,
            PasswordHashing::Md5 => stored == md5_hex(supplied),
            PasswordHashing::Argon2 => verify_password(supplied, stored),
        }
    }

    /// Counterpart of `matches` for a username with no admissible row. Does
    /// the same verification work against a stand-in credential and never
    /// matches.
    pub fn matches_missing(&self, supplied: &str) -> bool {
        if let (PasswordHashing::Argon2, Some(dummy)) = (self, DUMMY_HASH.as_ref()) {
            verify_password(supplied, dummy);
        }
        false
    }
}

fn md5_hex(password: &str) -> String {
    hex::encode(md5::compute(password.as_bytes()).0)
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::HashFailed(e.to_string()))
}

/// Verify a password against a PHC string. A malformed stored hash never matches.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
