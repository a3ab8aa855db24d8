//! Deposit address vault: the master key and the per-account address allocator.

pub mod allocator;
pub mod keys;

pub use allocator::{derive_address, DepositAddress, DepositAllocator, DEPOSIT_BRANCH};
pub use keys::{KeyError, MasterKey};
