//! The query surface the account services run against

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::types::{Account, AccountId, AccountState, CreationRecord, NewAccount, START_ACCOUNT_ID};
use crate::error::StoreError;

/// Parameterized queries over the login table and the account-creation audit
/// table. Implementations must be safe to share between concurrent callers.
///
/// `audit_table` arguments come from configuration, never from request input.
pub trait DataStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    /// Insert a login row and return the identifier assigned to it. Fails with
    /// `StoreError::UniqueViolation` if the username is already present.
    fn insert_account(&self, account: NewAccount) -> Result<AccountId, StoreError>;

    fn insert_creation_record(&self, audit_table: &str, record: &CreationRecord) -> Result<(), StoreError>;

    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    fn creation_record(&self, audit_table: &str, account_id: AccountId) -> Result<Option<CreationRecord>, StoreError>;

    /// Overwrite `state` and `unban_time` on one account. Returns the number of
    /// rows affected (0 when the account does not exist).
    fn update_ban_state(
        &self,
        account_id: AccountId,
        state: AccountState,
        unban_time: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    usernames: HashMap<String, AccountId>,
    creation_log: HashMap<String, HashMap<AccountId, CreationRecord>>,
    next_id: AccountId,
}

/// In-process store. Every query holds one lock, so the username check inside
/// `insert_account` is atomic.
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_id: START_ACCOUNT_ID,
                ..Tables::default()
            }),
        }
    }

    /// Insert a fully-formed row, bypassing registration. Used to seed
    /// accounts the game server creates itself (system accounts, GMs).
    pub fn seed(&self, account: Account) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.usernames.contains_key(&account.username) {
            return Err(StoreError::UniqueViolation {
                table: "login".to_string(),
                column: "userid",
            });
        }
        tables.next_id = tables.next_id.max(account.account_id + 1);
        tables.usernames.insert(account.username.clone(), account.account_id);
        tables.accounts.insert(account.account_id, account);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore for MemoryStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .usernames
            .get(username)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.usernames.contains_key(username))
    }

    fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.accounts.values().any(|a| a.email == email))
    }

    fn insert_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        let mut tables = self.lock()?;
        if tables.usernames.contains_key(&account.username) {
            return Err(StoreError::UniqueViolation {
                table: "login".to_string(),
                column: "userid",
            });
        }
        let account_id = tables.next_id;
        tables.next_id += 1;
        tables.usernames.insert(account.username.clone(), account_id);
        tables.accounts.insert(account_id, account.into_account(account_id));
        Ok(account_id)
    }

    fn insert_creation_record(&self, audit_table: &str, record: &CreationRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let table = tables.creation_log.entry(audit_table.to_string()).or_default();
        if table.contains_key(&record.account_id) {
            return Err(StoreError::UniqueViolation {
                table: audit_table.to_string(),
                column: "account_id",
            });
        }
        table.insert(record.account_id, record.clone());
        Ok(())
    }

    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(&account_id).cloned())
    }

    fn creation_record(&self, audit_table: &str, account_id: AccountId) -> Result<Option<CreationRecord>, StoreError> {
        Ok(self
            .lock()?
            .creation_log
            .get(audit_table)
            .and_then(|table| table.get(&account_id))
            .cloned())
    }

    fn update_ban_state(
        &self,
        account_id: AccountId,
        state: AccountState,
        unban_time: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        match tables.accounts.get_mut(&account_id) {
            Some(account) => {
                account.state = state;
                account.unban_time = unban_time;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
