//! Deposit verification: ledger providers, the price-backed crediting engine
//! and the claim/result types they exchange.

pub mod chains;
pub mod ledger;
pub mod service;
pub mod types;

pub use ledger::{LedgerClient, LedgerError, LedgerProvider, ProviderError};
pub use service::PaymentVerifier;
pub use types::{CreditResult, Rejection, RejectionReason, TransactionClaim, TransactionId, TransactionRecord};
