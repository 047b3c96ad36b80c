//! One login server: a store plus the services that run against it

use std::sync::Arc;

use crate::account::ban::{BanError, BanManager};
use crate::account::credentials::CredentialValidator;
use crate::account::registration::{RegisterError, RegistrationRequest, RegistrationService};
use crate::account::store::DataStore;
use crate::account::types::{Account, AccountId};
use crate::config::GatewayConfig;
use crate::error::StoreError;
use crate::session::RequestContext;

pub struct LoginServer {
    store: Arc<dyn DataStore>,
    credentials: CredentialValidator,
    registration: RegistrationService,
    bans: BanManager,
}

impl LoginServer {
    pub fn new(store: Arc<dyn DataStore>, config: &GatewayConfig) -> Self {
        let hashing = config.security.password_hashing;
        Self {
            credentials: CredentialValidator::new(store.clone(), hashing),
            registration: RegistrationService::new(store.clone(), config.registration.clone(), hashing),
            bans: BanManager::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn is_auth(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        self.credentials.verify(username, password)
    }

    pub fn register(&self, request: &RegistrationRequest, ctx: &RequestContext) -> Result<Account, RegisterError> {
        self.registration.register(request, ctx)
    }

    pub fn temporarily_ban(&self, account_id: AccountId, until: &str) -> Result<bool, BanError> {
        self.bans.temporarily_ban(account_id, until)
    }

    pub fn permanently_ban(&self, account_id: AccountId) -> Result<bool, StoreError> {
        self.bans.permanently_ban(account_id)
    }

    pub fn unban(&self, account_id: AccountId) -> Result<bool, StoreError> {
        self.bans.unban(account_id)
    }

    pub fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        self.store.account(account_id)
    }
}
