//! Account type definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::balance::Balances;
use super::store::StoreError;

/// Opaque account identifier
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        Uuid::from_slice(bytes)
            .map(Self)
            .map_err(|e| StoreError::Backend(format!("corrupt account id: {}", e)))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Account record as persisted by the account store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    // Identity
    pub id: AccountId,
    pub username: String,

    // Deposit address, fixed at creation
    pub derivation_index: u32,
    pub deposit_address: String,

    // State
    pub balances: Balances,
    pub processed_transaction_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// A verified deposit ready to be applied to an account.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositCredit {
    pub account_id: AccountId,
    /// Lowercase hex transaction id
    pub transaction_id: String,
    pub asset_amount: Decimal,
    pub settlement_amount: Decimal,
}

impl Account {
    /// A fresh account with zero balances.
    pub fn open(username: String, derivation_index: u32, deposit_address: String) -> Self {
        Self {
            id: AccountId::generate(),
            username,
            derivation_index,
            deposit_address,
            balances: Balances::default(),
            processed_transaction_ids: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_processed(&self, transaction_id: &str) -> bool {
        self.processed_transaction_ids.contains(transaction_id)
    }

    /// Apply a deposit. Either the balances and the replay set both change or neither does.
    pub fn record_credit(&mut self, credit: &DepositCredit) -> Result<(), StoreError> {
        if self.has_processed(&credit.transaction_id) {
            return Err(StoreError::AlreadyProcessed {
                txid: credit.transaction_id.clone(),
                owner: self.id,
            });
        }

        self.balances.credit(credit.asset_amount, credit.settlement_amount)?;
        self.processed_transaction_ids.insert(credit.transaction_id.clone());
        Ok(())
    }
}
