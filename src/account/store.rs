//! Account storage contract and the in-memory store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::balance::BalanceError;
use super::types::{Account, AccountId, DepositCredit};
use crate::vault::keys::KeyError;

/// Highest non-hardened BIP32 child index.
pub const MAX_DERIVATION_INDEX: u32 = (1 << 31) - 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("account not found")]
    AccountNotFound,
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("transaction {txid} was already credited to account {owner}")]
    AlreadyProcessed { txid: String, owner: AccountId },
    #[error("derivation index space exhausted")]
    IndexExhausted,
    #[error("address derivation failed: {0}")]
    Derivation(#[from] KeyError),
    #[error("balance update rejected: {0}")]
    Balance(#[from] BalanceError),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence the deposit core relies on.
///
/// Implementations must make `create_account` and `apply_credit` atomic:
/// index assignment is linearizable, and a transaction id is credited to at
/// most one account, at most once, even under concurrent callers.
pub trait AccountStore: Send + Sync {
    /// Assign the next derivation index, derive its address with `derive`,
    /// and persist the new account, all as one transaction.
    fn create_account(
        &self,
        username: &str,
        derive: &dyn Fn(u32) -> Result<String, KeyError>,
    ) -> Result<Account, StoreError>;

    fn get(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    /// Account that already owns `transaction_id`, if any.
    fn transaction_owner(&self, transaction_id: &str) -> Result<Option<AccountId>, StoreError>;

    /// Credit the account unless the transaction id has been credited anywhere before.
    fn apply_credit(&self, credit: &DepositCredit) -> Result<Account, StoreError>;

    fn account_count(&self) -> Result<u64, StoreError>;
}

/// Usernames are unique ignoring case.
pub(crate) fn username_key(username: &str) -> String {
    username.trim().to_lowercase()
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    usernames: HashMap<String, AccountId>,
    tx_index: HashMap<String, AccountId>,
    next_index: u32,
}

/// Process-local store. One mutex guards every table, so each operation is a
/// single critical section.
#[derive(Default)]
pub struct MemoryAccountStore {
    state: Mutex<MemoryState>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|e| {
            tracing::error!("Account store mutex poisoned: {}", e);
            StoreError::Backend("account store mutex poisoned".to_string())
        })
    }
}

impl AccountStore for MemoryAccountStore {
    fn create_account(
        &self,
        username: &str,
        derive: &dyn Fn(u32) -> Result<String, KeyError>,
    ) -> Result<Account, StoreError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let key = username_key(username);
        if state.usernames.contains_key(&key) {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }

        let index = state.next_index;
        if index > MAX_DERIVATION_INDEX {
            return Err(StoreError::IndexExhausted);
        }

        let address = derive(index)?;
        let account = Account::open(username.to_string(), index, address);

        state.next_index = index + 1;
        state.usernames.insert(key, account.id);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn get(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(id).cloned())
    }

    fn transaction_owner(&self, transaction_id: &str) -> Result<Option<AccountId>, StoreError> {
        Ok(self.lock()?.tx_index.get(transaction_id).copied())
    }

    fn apply_credit(&self, credit: &DepositCredit) -> Result<Account, StoreError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if let Some(owner) = state.tx_index.get(&credit.transaction_id) {
            return Err(StoreError::AlreadyProcessed {
                txid: credit.transaction_id.clone(),
                owner: *owner,
            });
        }

        let account = state
            .accounts
            .get_mut(&credit.account_id)
            .ok_or(StoreError::AccountNotFound)?;
        account.record_credit(credit)?;

        state.tx_index.insert(credit.transaction_id.clone(), credit.account_id);
        Ok(account.clone())
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.accounts.len() as u64)
    }
}
