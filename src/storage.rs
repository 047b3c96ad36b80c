use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use std::path::Path;

use crate::account::store::DataStore;
use crate::account::types::{Account, AccountId, AccountState, CreationRecord, NewAccount, START_ACCOUNT_ID};
use crate::error::StoreError;

/// Sled-backed `DataStore`. Each table is a tree named `<database>.<table>`,
/// rows are bincode-encoded and keyed by big-endian account id.
///
/// `login_userid` maps username to id and is the unique constraint.
/// `login_email` is a non-unique index keyed by `email_prefix(email) ++ id`.
pub struct SledStore {
    db: sled::Db,
    login_database: String,
    accounts: sled::Tree,
    usernames: sled::Tree,
    emails: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>, login_database: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db, login_database)
    }

    /// Throwaway database that is removed when dropped
    pub fn temporary(login_database: &str) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, login_database)
    }

    fn from_db(db: sled::Db, login_database: &str) -> Result<Self, StoreError> {
        let accounts = db.open_tree(format!("{}.login", login_database))?;
        let usernames = db.open_tree(format!("{}.login_userid", login_database))?;
        let emails = db.open_tree(format!("{}.login_email", login_database))?;
        Ok(SledStore {
            db,
            login_database: login_database.to_string(),
            accounts,
            usernames,
            emails,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn table(&self, name: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(format!("{}.{}", self.login_database, name))?)
    }

    fn login_table(&self) -> String {
        format!("{}.login", self.login_database)
    }
}

// Generic Helpers
fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: for<'a> Deserialize<'a>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

fn id_key(account_id: AccountId) -> [u8; 8] {
    account_id.to_be_bytes()
}

// Length-prefixed so one address is never a prefix of another
fn email_prefix(email: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + email.len());
    prefix.extend_from_slice(&(email.len() as u32).to_be_bytes());
    prefix.extend_from_slice(email.as_bytes());
    prefix
}

impl DataStore for SledStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        match self.usernames.get(username.as_bytes())? {
            Some(id) => match self.accounts.get(id)? {
                Some(row) => Ok(Some(decode(&row)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.usernames.contains_key(username.as_bytes())?)
    }

    fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        match self.emails.scan_prefix(email_prefix(email)).next() {
            Some(entry) => {
                entry?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        let account_id = START_ACCOUNT_ID + self.db.generate_id()?;
        let key = id_key(account_id);
        let mut email_key = email_prefix(&account.email);
        email_key.extend_from_slice(&key);
        let username = account.username.clone();
        let row = encode(&account.into_account(account_id))?;

        // Index entry, row and email index land together or not at all
        let result = (&self.usernames, &self.accounts, &self.emails).transaction(
            |(usernames, accounts, emails)| -> ConflictableTransactionResult<(), ()> {
                if usernames.get(username.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                usernames.insert(username.as_bytes(), &key[..])?;
                accounts.insert(&key[..], &row[..])?;
                emails.insert(&email_key[..], &key[..])?;
                Ok(())
            },
        );

        match result {
            Ok(()) => Ok(account_id),
            Err(TransactionError::Abort(())) => Err(StoreError::UniqueViolation {
                table: self.login_table(),
                column: "userid",
            }),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn insert_creation_record(&self, audit_table: &str, record: &CreationRecord) -> Result<(), StoreError> {
        let table = self.table(audit_table)?;
        let row = encode(record)?;
        let inserted = table.compare_and_swap(id_key(record.account_id), None as Option<&[u8]>, Some(row))?;
        if inserted.is_err() {
            return Err(StoreError::UniqueViolation {
                table: format!("{}.{}", self.login_database, audit_table),
                column: "account_id",
            });
        }
        Ok(())
    }

    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        match self.accounts.get(id_key(account_id))? {
            Some(row) => Ok(Some(decode(&row)?)),
            None => Ok(None),
        }
    }

    fn creation_record(&self, audit_table: &str, account_id: AccountId) -> Result<Option<CreationRecord>, StoreError> {
        match self.table(audit_table)?.get(id_key(account_id))? {
            Some(row) => Ok(Some(decode(&row)?)),
            None => Ok(None),
        }
    }

    fn update_ban_state(
        &self,
        account_id: AccountId,
        state: AccountState,
        unban_time: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let key = id_key(account_id);
        loop {
            let Some(current) = self.accounts.get(key)? else {
                return Ok(0);
            };
            let mut account: Account = decode(&current)?;
            account.state = state;
            account.unban_time = unban_time;
            let updated = encode(&account)?;

            // Retry if another writer replaced the row in between
            if self.accounts.compare_and_swap(key, Some(current), Some(updated))?.is_ok() {
                return Ok(1);
            }
        }
    }
}
