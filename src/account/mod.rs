//! Account management core for the login gateway
//!
//! This module implements:
//! - Credential verification against the login table
//! - Self-service registration with ordered validation
//! - Administrative ban, temporary ban and unban

pub mod types;
pub mod auth;
pub mod store;
pub mod credentials;
pub mod registration;
pub mod ban;

pub use types::{Account, AccountId, AccountState, CreationRecord, Gender, NewAccount};
pub use auth::PasswordHashing;
pub use store::{DataStore, MemoryStore};
pub use credentials::CredentialValidator;
pub use registration::{RegisterError, RegisterErrorKind, RegistrationRequest, RegistrationService};
pub use ban::{BanError, BanManager};
