use std::{collections::HashMap, error::Error};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Account, Email, HashedPassword};

pub type StoreError = Box<dyn Error + Send + Sync>;

/// Persistence for user accounts.
///
/// Methods take `&self` so that lookups for concurrent logins never queue behind each other;
/// implementations are responsible for their own synchronisation.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Store the account unless another account already uses its email or its username.
    /// Returns whether the account was created.
    async fn create_account_if_not_exists(&self, account: &Account) -> Result<bool, StoreError>;

    /// Retrieve the stored password hash for the given email, or `None` if there is no such
    /// account. Errors are reserved for failures reaching the store.
    async fn get_password_hash(&self, email: &Email) -> Result<Option<HashedPassword>, StoreError>;
}

/// An [`AccountStore`] that keeps accounts in process memory, keyed by email.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<Email, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account_if_not_exists(&self, account: &Account) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;

        let taken = accounts.contains_key(&account.email)
            || accounts.values().any(|a| a.username == account.username);
        if taken {
            return Ok(false);
        }

        accounts.insert(account.email.clone(), account.clone());
        Ok(true)
    }

    async fn get_password_hash(&self, email: &Email) -> Result<Option<HashedPassword>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(email).map(|a| a.password_hash.clone()))
    }
}
