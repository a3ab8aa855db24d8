use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{abort, ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use tracing::debug;

use crate::account::store::{username_key, AccountStore, StoreError, MAX_DERIVATION_INDEX};
use crate::account::types::{Account, AccountId, DepositCredit};
use crate::vault::keys::KeyError;

const ACCOUNTS_TREE: &str = "accounts";
const USERNAMES_TREE: &str = "usernames";
const TX_INDEX_TREE: &str = "tx_index";
const META_TREE: &str = "meta";

const NEXT_INDEX_KEY: &[u8] = b"next_derivation_index";

/// Durable account store on sled.
///
/// Trees:
/// - `accounts`: account id -> bincode `Account`
/// - `usernames`: lowercase username -> account id
/// - `tx_index`: transaction id -> owning account id (global replay authority)
/// - `meta`: derivation counter
pub struct SledAccountStore {
    db: Db,
    accounts: Tree,
    usernames: Tree,
    tx_index: Tree,
    meta: Tree,
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

// Generic Helper: encode
fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(backend)
}

// Generic Helper: decode
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(backend)
}

fn decode_index(bytes: &[u8]) -> Result<u32, StoreError> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StoreError::Backend("corrupt derivation counter".to_string()))?;
    Ok(u32::from_be_bytes(raw))
}

fn unwrap_tx<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => backend(e),
    })
}

impl SledAccountStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(backend)?;
        Self::from_db(db)
    }

    /// A throwaway database removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open().map_err(backend)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            accounts: db.open_tree(ACCOUNTS_TREE).map_err(backend)?,
            usernames: db.open_tree(USERNAMES_TREE).map_err(backend)?,
            tx_index: db.open_tree(TX_INDEX_TREE).map_err(backend)?,
            meta: db.open_tree(META_TREE).map_err(backend)?,
            db,
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map(|_| ()).map_err(backend)
    }
}

impl AccountStore for SledAccountStore {
    fn create_account(
        &self,
        username: &str,
        derive: &dyn Fn(u32) -> Result<String, KeyError>,
    ) -> Result<Account, StoreError> {
        let key = username_key(username);

        let result = (&self.accounts, &self.usernames, &self.meta).transaction(
            |(accounts, usernames, meta)| {
                if usernames.get(key.as_bytes())?.is_some() {
                    return abort(StoreError::UsernameTaken(username.to_string()));
                }

                let index = match meta.get(NEXT_INDEX_KEY)? {
                    Some(raw) => decode_index(&raw).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                if index > MAX_DERIVATION_INDEX {
                    return abort(StoreError::IndexExhausted);
                }

                let address = derive(index)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                let account = Account::open(username.to_string(), index, address);
                let bytes = encode(&account).map_err(ConflictableTransactionError::Abort)?;

                accounts.insert(&account.id.as_bytes()[..], bytes)?;
                usernames.insert(key.as_bytes(), &account.id.as_bytes()[..])?;
                meta.insert(NEXT_INDEX_KEY, &(index + 1).to_be_bytes()[..])?;
                Ok(account)
            },
        );

        let account = unwrap_tx(result)?;
        self.flush()?;
        debug!(account = %account.id, index = account.derivation_index, "account persisted");
        Ok(account)
    }

    fn get(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        match self.accounts.get(&id.as_bytes()[..]).map_err(backend)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn transaction_owner(&self, transaction_id: &str) -> Result<Option<AccountId>, StoreError> {
        match self.tx_index.get(transaction_id.as_bytes()).map_err(backend)? {
            Some(raw) => Ok(Some(AccountId::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn apply_credit(&self, credit: &DepositCredit) -> Result<Account, StoreError> {
        let account_key = &credit.account_id.as_bytes()[..];
        let txid = credit.transaction_id.as_bytes();

        let result = (&self.accounts, &self.tx_index).transaction(|(accounts, tx_index)| {
            if let Some(owner) = tx_index.get(txid)? {
                let owner = AccountId::from_slice(&owner).map_err(ConflictableTransactionError::Abort)?;
                return abort(StoreError::AlreadyProcessed {
                    txid: credit.transaction_id.clone(),
                    owner,
                });
            }

            let raw = match accounts.get(account_key)? {
                Some(raw) => raw,
                None => return abort(StoreError::AccountNotFound),
            };
            let mut account: Account = decode(&raw).map_err(ConflictableTransactionError::Abort)?;
            account
                .record_credit(credit)
                .map_err(ConflictableTransactionError::Abort)?;

            let bytes = encode(&account).map_err(ConflictableTransactionError::Abort)?;
            accounts.insert(account_key, bytes)?;
            tx_index.insert(txid, account_key)?;
            Ok(account)
        });

        let account = unwrap_tx(result)?;
        self.flush()?;
        Ok(account)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.accounts.len() as u64)
    }
}
