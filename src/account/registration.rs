//! Self-service account registration
//!
//! Requests pass an ordered chain of checks; the first failing check is the
//! only one reported. Accepted requests produce a login row and a matching
//! row in the account-creation audit table.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::auth::{AuthError, PasswordHashing};
use super::store::DataStore;
use super::types::{Account, AccountId, CreationRecord, Gender, NewAccount};
use crate::config::RegistrationPolicy;
use crate::error::StoreError;
use crate::session::RequestContext;

/// Why a registration was refused. Declaration order is check order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterErrorKind {
    #[error("Username is too short")]
    UsernameTooShort,
    #[error("Username is too long")]
    UsernameTooLong,
    #[error("Password is too short")]
    PasswordTooShort,
    #[error("Password is too long")]
    PasswordTooLong,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Invalid e-mail address")]
    InvalidEmailAddress,
    #[error("Invalid gender")]
    InvalidGender,
    #[error("Invalid security code")]
    InvalidSecurityCode,
    #[error("Username is already taken")]
    UsernameAlreadyTaken,
    #[error("E-mail address is already in use")]
    EmailAddressInUse,
}

impl RegisterErrorKind {
    /// Stable numeric code for clients that localize messages themselves
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error(transparent)]
    Rejected(#[from] RegisterErrorKind),
    #[error(transparent)]
    Hashing(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The login row was written but its audit row was not
    #[error("Account {account_id} was created but its creation record was not: {source}")]
    OrphanedAccount {
        account_id: AccountId,
        source: StoreError,
    },
}

impl RegisterError {
    /// The policy rejection, if this is one
    pub fn kind(&self) -> Option<RegisterErrorKind> {
        match self {
            RegisterError::Rejected(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Form fields exactly as the player submitted them
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub email: String,
    pub gender: String,
    pub security_code: String,
}

pub struct RegistrationService {
    store: Arc<dyn DataStore>,
    policy: RegistrationPolicy,
    hashing: PasswordHashing,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn DataStore>, policy: RegistrationPolicy, hashing: PasswordHashing) -> Self {
        Self { store, policy, hashing }
    }

    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    /// Validate and, if accepted, create the account and its creation record.
    ///
    /// The username check and the insert are not atomic with each other; a
    /// concurrent registration of the same name surfaces as
    /// `RegisterError::Store(StoreError::UniqueViolation { .. })` from the insert.
    pub fn register(&self, request: &RegistrationRequest, ctx: &RequestContext) -> Result<Account, RegisterError> {
        let gender = match self.check(request, ctx) {
            Ok(gender) => gender,
            Err(RegisterError::Rejected(kind)) => {
                info!(username = %request.username, reason = %kind, "registration rejected");
                return Err(kind.into());
            }
            Err(e) => return Err(e),
        };

        let new_account = NewAccount {
            username: request.username.clone(),
            password_credential: self.hashing.hash(&request.password)?,
            email: request.email.clone(),
            gender,
        };
        let account_id = self.store.insert_account(new_account.clone())?;

        let record = CreationRecord {
            account_id,
            username: new_account.username.clone(),
            password_credential: new_account.password_credential.clone(),
            gender,
            email: new_account.email.clone(),
            reg_date: Utc::now(),
            reg_ip: ctx.remote_addr.clone(),
        };
        if let Err(source) = self
            .store
            .insert_creation_record(&self.policy.account_create_table, &record)
        {
            error!(account_id, table = %self.policy.account_create_table, "creation record insert failed, login row left without audit record: {}", source);
            return Err(RegisterError::OrphanedAccount { account_id, source });
        }

        info!(account_id, username = %new_account.username, reg_ip = %record.reg_ip, "account registered");
        Ok(new_account.into_account(account_id))
    }

    /// Run the full check chain without writing anything
    pub fn check(&self, request: &RegistrationRequest, ctx: &RequestContext) -> Result<Gender, RegisterError> {
        let gender = self.check_form(request, ctx)?;

        if self.store.username_exists(&request.username)? {
            return Err(RegisterErrorKind::UsernameAlreadyTaken.into());
        }
        if !self.policy.allow_duplicate_emails && self.store.email_exists(&request.email)? {
            return Err(RegisterErrorKind::EmailAddressInUse.into());
        }
        Ok(gender)
    }

    /// The checks that need no store access
    fn check_form(&self, request: &RegistrationRequest, ctx: &RequestContext) -> Result<Gender, RegisterErrorKind> {
        let policy = &self.policy;
        let username_len = request.username.len();
        let password_len = request.password.len();

        if username_len < policy.min_username_length {
            return Err(RegisterErrorKind::UsernameTooShort);
        }
        if username_len > policy.max_username_length {
            return Err(RegisterErrorKind::UsernameTooLong);
        }
        if password_len < policy.min_password_length {
            return Err(RegisterErrorKind::PasswordTooShort);
        }
        if password_len > policy.max_password_length {
            return Err(RegisterErrorKind::PasswordTooLong);
        }
        if request.password != request.confirm_password {
            return Err(RegisterErrorKind::PasswordMismatch);
        }
        if !looks_like_email(&request.email) {
            return Err(RegisterErrorKind::InvalidEmailAddress);
        }
        let gender = Gender::from_registration(&request.gender).ok_or(RegisterErrorKind::InvalidGender)?;
        if policy.use_captcha && !ctx.security_code_matches(&request.security_code) {
            return Err(RegisterErrorKind::InvalidSecurityCode);
        }
        Ok(gender)
    }
}

/// Minimal shape check: some `@` with a character on either side. Anything
/// stricter is left to the mail round trip.
fn looks_like_email(email: &str) -> bool {
    let chars: Vec<char> = email.chars().collect();
    chars
        .windows(3)
        .any(|w| w[1] == '@' && w[0] != '\n' && w[2] != '\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::store::MemoryStore;
    use crate::account::types::{AccountState, START_ACCOUNT_ID};
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const AUDIT_TABLE: &str = "cp_createlog";

    fn policy() -> RegistrationPolicy {
        RegistrationPolicy {
            min_username_length: 4,
            max_username_length: 23,
            min_password_length: 6,
            max_password_length: 31,
            use_captcha: false,
            allow_duplicate_emails: false,
            account_create_table: AUDIT_TABLE.to_string(),
        }
    }

    fn service_with(store: Arc<dyn DataStore>, policy: RegistrationPolicy) -> RegistrationService {
        RegistrationService::new(store, policy, PasswordHashing::Plaintext)
    }

    fn request(username: &str, password: &str, confirm: &str, email: &str, gender: &str) -> RegistrationRequest {
        RegistrationRequest {
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
            email: email.to_string(),
            gender: gender.to_string(),
            security_code: String::new(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("203.0.113.7")
    }

    fn kind_of(result: Result<Account, RegisterError>) -> RegisterErrorKind {
        result.unwrap_err().kind().expect("expected a policy rejection")
    }

    #[test]
    fn test_documented_scenarios() {
        let service = service_with(Arc::new(MemoryStore::new()), policy());

        let r = service.register(&request("abc", "secret1", "secret1", "a@b.com", "m"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::UsernameTooShort);

        let r = service.register(&request("abcd", "secret1", "secret2", "a@b.com", "m"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::PasswordMismatch);

        let r = service.register(&request("abcd", "secret1", "secret1", "a@b.com", "x"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::InvalidGender);
    }

    #[test]
    fn test_first_violation_wins() {
        let service = service_with(Arc::new(MemoryStore::new()), policy());

        // Everything wrong: the username rule is reported
        let r = service.register(&request("ab", "x", "y", "bad", "q"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::UsernameTooShort);

        let r = service.register(&request(&"a".repeat(24), "x", "y", "bad", "q"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::UsernameTooLong);

        let r = service.register(&request("abcd", "x", "y", "bad", "q"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::PasswordTooShort);

        let long = "p".repeat(32);
        let r = service.register(&request("abcd", &long, "y", "bad", "q"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::PasswordTooLong);

        let r = service.register(&request("abcd", "secret1", "secret1", "bad", "q"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::InvalidEmailAddress);
    }

    #[test]
    fn test_lengths_are_inclusive_bounds() {
        let service = service_with(Arc::new(MemoryStore::new()), policy());
        let name = "a".repeat(23);
        let pass = "p".repeat(31);
        assert!(service.register(&request(&name, &pass, &pass, "a@b.com", "F"), &ctx()).is_ok());
        assert!(service.register(&request("abcd", "secret", "secret", "c@d.com", "f"), &ctx()).is_ok());
    }

    #[test]
    fn test_email_shape() {
        assert!(looks_like_email("a@b"));
        assert!(looks_like_email("a@b.com"));
        assert!(looks_like_email("x a@b y"));
        assert!(!looks_like_email("@b.com"));
        assert!(!looks_like_email("a@"));
        assert!(!looks_like_email("ab.com"));
        assert!(!looks_like_email("a\n@b"));
        assert!(!looks_like_email(""));
    }

    #[test]
    fn test_captcha() {
        let mut p = policy();
        p.use_captcha = true;
        let service = service_with(Arc::new(MemoryStore::new()), p);

        let mut req = request("abcd", "secret1", "secret1", "a@b.com", "m");
        req.security_code = "K7pQ".to_string();

        let r = service.register(&req, &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::InvalidSecurityCode);

        let r = service.register(&req, &ctx().with_security_code("k7pq"));
        assert_eq!(kind_of(r), RegisterErrorKind::InvalidSecurityCode);

        assert!(service.register(&req, &ctx().with_security_code("K7pQ")).is_ok());
    }

    #[test]
    fn test_captcha_ignored_when_disabled() {
        let service = service_with(Arc::new(MemoryStore::new()), policy());
        let mut req = request("abcd", "secret1", "secret1", "a@b.com", "m");
        req.security_code = "anything".to_string();
        assert!(service.register(&req, &ctx()).is_ok());
    }

    #[test]
    fn test_taken_username_beats_duplicate_email() {
        let service = service_with(Arc::new(MemoryStore::new()), policy());
        service
            .register(&request("alice", "secret1", "secret1", "a@b.com", "f"), &ctx())
            .unwrap();

        let r = service.register(&request("alice", "secret2", "secret2", "a@b.com", "f"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::UsernameAlreadyTaken);

        let r = service.register(&request("alice", "secret2", "secret2", "new@b.com", "f"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::UsernameAlreadyTaken);
    }

    #[test]
    fn test_duplicate_email_policy() {
        let store = Arc::new(MemoryStore::new());
        let strict = service_with(store.clone(), policy());
        strict
            .register(&request("alice", "secret1", "secret1", "a@b.com", "f"), &ctx())
            .unwrap();

        let r = strict.register(&request("bobby", "secret1", "secret1", "a@b.com", "m"), &ctx());
        assert_eq!(kind_of(r), RegisterErrorKind::EmailAddressInUse);

        let mut relaxed_policy = policy();
        relaxed_policy.allow_duplicate_emails = true;
        let relaxed = service_with(store, relaxed_policy);
        assert!(relaxed
            .register(&request("bobby", "secret1", "secret1", "a@b.com", "m"), &ctx())
            .is_ok());
    }

    #[test]
    fn test_success_writes_account_and_audit_row() {
        let store = Arc::new(MemoryStore::new());
        let service = RegistrationService::new(store.clone(), policy(), PasswordHashing::Md5);

        let before = Utc::now();
        let account = service
            .register(&request("alice", "password", "password", "a@b.com", "f"), &ctx())
            .unwrap();

        assert_eq!(account.account_id, START_ACCOUNT_ID);
        let stored = store.account(account.account_id).unwrap().unwrap();
        assert_eq!(stored, account);
        assert_eq!(stored.gender, Gender::Female);
        assert_eq!(stored.state, AccountState::NORMAL);
        assert_eq!(stored.unban_time, None);
        assert_eq!(stored.password_credential, "5f4dcc3b5aa765d61d8327deb882cf99");

        let record = store.creation_record(AUDIT_TABLE, account.account_id).unwrap().unwrap();
        assert_eq!(record.reg_ip, "203.0.113.7");
        assert!(record.reg_date >= before);
        assert_eq!(record.username, "alice");
        assert_eq!(record.password_credential, stored.password_credential);
    }

    #[test]
    fn test_error_codes_follow_check_order() {
        assert_eq!(RegisterErrorKind::UsernameTooShort.code(), 0);
        assert_eq!(RegisterErrorKind::EmailAddressInUse.code(), 9);
        assert_eq!(RegisterErrorKind::PasswordMismatch.to_string(), "Passwords do not match");
    }

    /// Accepts login rows but refuses audit rows
    struct AuditFailingStore {
        inner: MemoryStore,
    }

    impl DataStore for AuditFailingStore {
        fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_username(username)
        }
        fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
            self.inner.username_exists(username)
        }
        fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
            self.inner.email_exists(email)
        }
        fn insert_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
            self.inner.insert_account(account)
        }
        fn insert_creation_record(&self, _: &str, _: &CreationRecord) -> Result<(), StoreError> {
            Err(StoreError::Backend("table is read-only".to_string()))
        }
        fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
            self.inner.account(account_id)
        }
        fn creation_record(&self, table: &str, account_id: AccountId) -> Result<Option<CreationRecord>, StoreError> {
            self.inner.creation_record(table, account_id)
        }
        fn update_ban_state(
            &self,
            account_id: AccountId,
            state: AccountState,
            unban_time: Option<DateTime<Utc>>,
        ) -> Result<u64, StoreError> {
            self.inner.update_ban_state(account_id, state, unban_time)
        }
    }

    #[test]
    fn test_audit_failure_reports_orphan() {
        let store = Arc::new(AuditFailingStore { inner: MemoryStore::new() });
        let service = service_with(store.clone(), policy());

        let err = service
            .register(&request("alice", "secret1", "secret1", "a@b.com", "f"), &ctx())
            .unwrap_err();
        let RegisterError::OrphanedAccount { account_id, .. } = &err else {
            panic!("expected orphaned account, got {:?}", err);
        };
        assert!(err.kind().is_none());
        assert!(store.account(*account_id).unwrap().is_some());
        assert!(store.creation_record(AUDIT_TABLE, *account_id).unwrap().is_none());
    }

    /// Answers every existence check with "free", as if a concurrent
    /// registration committed between the check and the insert
    struct StaleReadStore {
        inner: MemoryStore,
        creation_inserts: AtomicUsize,
    }

    impl DataStore for StaleReadStore {
        fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_username(username)
        }
        fn username_exists(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn email_exists(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn insert_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
            self.inner.insert_account(account)
        }
        fn insert_creation_record(&self, table: &str, record: &CreationRecord) -> Result<(), StoreError> {
            self.creation_inserts.fetch_add(1, Ordering::SeqCst);
            self.inner.insert_creation_record(table, record)
        }
        fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
            self.inner.account(account_id)
        }
        fn creation_record(&self, table: &str, account_id: AccountId) -> Result<Option<CreationRecord>, StoreError> {
            self.inner.creation_record(table, account_id)
        }
        fn update_ban_state(
            &self,
            account_id: AccountId,
            state: AccountState,
            unban_time: Option<DateTime<Utc>>,
        ) -> Result<u64, StoreError> {
            self.inner.update_ban_state(account_id, state, unban_time)
        }
    }

    #[test]
    fn test_lost_insert_race_is_a_store_fault() {
        let store = Arc::new(StaleReadStore {
            inner: MemoryStore::new(),
            creation_inserts: AtomicUsize::new(0),
        });
        let service = service_with(store.clone(), policy());
        let winner = service
            .register(&request("alice", "secret1", "secret1", "a@b.com", "f"), &ctx())
            .unwrap();
        assert_eq!(store.creation_inserts.load(Ordering::SeqCst), 1);

        let err = service
            .register(&request("alice", "secret2", "secret2", "z@b.com", "m"), &ctx())
            .unwrap_err();
        assert!(
            matches!(err, RegisterError::Store(StoreError::UniqueViolation { column: "userid", .. })),
            "got {:?}",
            err
        );
        assert!(err.kind().is_none());

        // The loser wrote no audit row and left the winner intact
        assert_eq!(store.creation_inserts.load(Ordering::SeqCst), 1);
        let stored = store.find_by_username("alice").unwrap().unwrap();
        assert_eq!(stored.account_id, winner.account_id);
        assert_eq!(stored.email, "a@b.com");
    }

    #[test]
    fn test_check_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), policy());
        let gender = service
            .check(&request("alice", "secret1", "secret1", "a@b.com", "F"), &ctx())
            .unwrap();
        assert_eq!(gender, Gender::Female);
        assert!(!store.username_exists("alice").unwrap());
    }
}
