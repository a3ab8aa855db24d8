use std::sync::Arc;

use bitcoin::Address;
use serde::Serialize;
use tracing::info;

use super::keys::{KeyError, MasterKey};
use crate::account::store::{AccountStore, StoreError};
use crate::account::types::Account;

/// First derivation level under the master key. Branch 0 is reserved for
/// customer deposit addresses.
pub const DEPOSIT_BRANCH: u32 = 0;

/// Minimum username length accepted when opening an account.
const MIN_USERNAME_LEN: usize = 3;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DepositAddress {
    pub index: u32,
    /// Compressed SEC1 public key, hex encoded
    pub public_key: String,
    /// Native segwit (P2WPKH) receive address on the master key's network
    pub address: String,
}

/// Derive the deposit address for `index`. Pure and deterministic.
pub fn derive_address(key: &MasterKey, index: u32) -> Result<DepositAddress, KeyError> {
    let public_key = key.derive_child(DEPOSIT_BRANCH, index)?;
    let address = Address::p2wpkh(&public_key, key.network());

    Ok(DepositAddress {
        index,
        public_key: hex::encode(public_key.0.serialize()),
        address: address.to_string(),
    })
}

/// Opens accounts with a freshly derived, never reused deposit address.
pub struct DepositAllocator {
    key: Arc<MasterKey>,
    store: Arc<dyn AccountStore>,
}

impl DepositAllocator {
    pub fn new(key: Arc<MasterKey>, store: Arc<dyn AccountStore>) -> Self {
        Self { key, store }
    }

    /// Create an account and bind it to the next derivation index.
    ///
    /// Index assignment, derivation and persistence happen inside a single
    /// store transaction so concurrent signups never share an index.
    pub fn open_account(&self, username: &str) -> Result<Account, StoreError> {
        let username = username.trim();
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(StoreError::InvalidUsername(format!(
                "must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }

        let key = &self.key;
        let account = self
            .store
            .create_account(username, &|index| derive_address(key, index).map(|d| d.address))?;

        info!(
            account = %account.id,
            index = account.derivation_index,
            address = %account.deposit_address,
            "opened deposit account"
        );
        Ok(account)
    }

    pub fn network(&self) -> bitcoin::Network {
        self.key.network()
    }

    /// Address a given index would receive, without touching the store.
    pub fn preview(&self, index: u32) -> Result<DepositAddress, KeyError> {
        derive_address(&self.key, index)
    }
}
