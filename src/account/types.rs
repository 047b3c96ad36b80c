//! Account record definitions shared by the services and the stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric account identifier, assigned by the store
pub type AccountId = u64;

/// First identifier handed out by a fresh store; lower numbers are reserved
/// by the game server.
pub const START_ACCOUNT_ID: AccountId = 2_000_000;

/// Account gender as stored in the login table
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    /// Reserved for server-internal accounts; never authenticates
    #[serde(rename = "S")]
    System,
}

impl Gender {
    pub fn code(&self) -> char {
        match self {
            Gender::Male => 'M',
            Gender::Female => 'F',
            Gender::System => 'S',
        }
    }

    /// Parse a gender a player may choose for themselves (`m`/`f`, any case).
    pub fn from_registration(input: &str) -> Option<Gender> {
        match input.to_ascii_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M" => Ok(Gender::Male),
            "F" => Ok(Gender::Female),
            "S" => Ok(Gender::System),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// Login-table status code. Only the two values below are written here;
/// anything else the game server stores is carried through untouched.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountState(pub u32);

impl AccountState {
    pub const NORMAL: AccountState = AccountState(0);
    pub const PERMANENTLY_BANNED: AccountState = AccountState(5);

    pub fn is_normal(&self) -> bool {
        *self == Self::NORMAL
    }
}

impl Default for AccountState {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// A row of the login table
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    pub account_id: AccountId,
    pub username: String,
    /// Password after the configured transform (plaintext, digest or PHC hash)
    pub password_credential: String,
    pub email: String,
    pub gender: Gender,
    /// Group level; negative levels are locked out of login
    pub level: i32,
    pub state: AccountState,
    /// `None` when no temporary ban is pending
    pub unban_time: Option<DateTime<Utc>>,
}

impl Account {
    /// Whether the login filter admits this row at all, before any password check
    pub fn is_authenticatable(&self) -> bool {
        self.gender != Gender::System && self.level >= 0
    }
}

/// Values for a login-table insert; the store assigns the identifier
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub username: String,
    pub password_credential: String,
    pub email: String,
    pub gender: Gender,
}

impl NewAccount {
    pub fn into_account(self, account_id: AccountId) -> Account {
        Account {
            account_id,
            username: self.username,
            password_credential: self.password_credential,
            email: self.email,
            gender: self.gender,
            level: 0,
            state: AccountState::NORMAL,
            unban_time: None,
        }
    }
}

/// A row of the account-creation audit table
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CreationRecord {
    pub account_id: AccountId,
    pub username: String,
    pub password_credential: String,
    pub gender: Gender,
    pub email: String,
    pub reg_date: DateTime<Utc>,
    pub reg_ip: String,
}
