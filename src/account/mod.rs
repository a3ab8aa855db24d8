//! Deposit accounts
//!
//! - Account records with an immutable derivation index and deposit address
//! - Decimal asset and settlement balances
//! - The `AccountStore` contract the crediting engine depends on

pub mod balance;
pub mod store;
pub mod types;

pub use balance::{BalanceError, Balances};
pub use store::{AccountStore, MemoryAccountStore, StoreError};
pub use types::{Account, AccountId, DepositCredit};
