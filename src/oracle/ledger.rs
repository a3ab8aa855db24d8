use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{TransactionId, TransactionRecord};

/// Failure of a single provider call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("transaction not found")]
    NotFound,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of the whole fallback chain.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transaction not found by any ledger provider")]
    NotFound,
    #[error("no ledger provider could be reached")]
    Unavailable,
}

/// One source of ledger data. Implementations normalize their own response
/// schema into a `TransactionRecord` before returning.
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError>;
}

/// Ordered provider chain with a hard per-call deadline.
pub struct LedgerClient {
    providers: Vec<Arc<dyn LedgerProvider>>,
    timeout: Duration,
}

impl LedgerClient {
    pub fn new(providers: Vec<Arc<dyn LedgerProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Ask each provider in turn until one returns the transaction.
    ///
    /// `NotFound` is only reported when some provider answered "not found"
    /// and none returned a record; if nobody answered at all the result is
    /// `Unavailable`.
    pub async fn fetch_transaction(&self, txid: &TransactionId) -> Result<TransactionRecord, LedgerError> {
        let mut saw_not_found = false;

        for provider in &self.providers {
            let outcome = match tokio::time::timeout(self.timeout, provider.fetch(txid)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(record) if record.txid == *txid => {
                    debug!(provider = provider.name(), %txid, confirmed = record.confirmed, "ledger lookup succeeded");
                    return Ok(record);
                }
                Ok(record) => {
                    warn!(
                        provider = provider.name(),
                        requested = %txid,
                        returned = %record.txid,
                        "provider returned a different transaction, falling back"
                    );
                }
                Err(ProviderError::NotFound) => {
                    debug!(provider = provider.name(), %txid, "transaction not found by provider");
                    saw_not_found = true;
                }
                Err(e) => {
                    warn!(provider = provider.name(), %txid, error = %e, "ledger provider failed, falling back");
                }
            }
        }

        if saw_not_found {
            Err(LedgerError::NotFound)
        } else {
            Err(LedgerError::Unavailable)
        }
    }
}
