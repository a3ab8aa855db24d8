use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::account::types::AccountId;

/// Ticker of the deposited asset.
pub const ASSET_TICKER: &str = "BTC";

/// Satoshis per BTC, as a power of ten.
pub const ASSET_DECIMALS: u32 = 8;

/// Exact satoshi -> BTC scaling.
pub fn sats_to_asset(sats: u64) -> Decimal {
    Decimal::from_i128_with_scale(sats as i128, ASSET_DECIMALS)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transaction id must be {} hexadecimal characters", TransactionId::HEX_LEN)]
pub struct InvalidTransactionId;

/// A validated ledger transaction id: 64 hex characters, stored lowercase so
/// case variants share one replay key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub const HEX_LEN: usize = 64;

    pub fn parse(raw: &str) -> Result<Self, InvalidTransactionId> {
        if raw.len() != Self::HEX_LEN || hex::decode(raw).is_err() {
            return Err(InvalidTransactionId);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a provider-reported id refers to this transaction.
    pub fn matches(&self, reported: &str) -> bool {
        self.0.eq_ignore_ascii_case(reported)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    /// `None` for outputs without a standard address (OP_RETURN, bare multisig)
    pub address: Option<String>,
    pub amount: Decimal,
    pub unit: &'static str,
}

impl TxOutput {
    pub fn from_sats(address: Option<String>, sats: u64) -> Self {
        Self {
            address,
            amount: sats_to_asset(sats),
            unit: ASSET_TICKER,
        }
    }
}

/// Provider-independent view of a ledger transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub txid: TransactionId,
    pub outputs: Vec<TxOutput>,
    /// At least one confirmation
    pub confirmed: bool,
}

impl TransactionRecord {
    /// Amount of the first output paying `address`.
    pub fn amount_paid_to(&self, address: &str) -> Option<Decimal> {
        self.outputs
            .iter()
            .find(|o| o.address.as_deref() == Some(address))
            .map(|o| o.amount)
    }
}

/// A client's claim that `transaction_id` paid into `claimed_address`.
/// Nothing in it is trusted.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionClaim {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub claimed_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    InvalidFormat,
    AccountNotFound,
    AddressMismatch,
    AlreadyProcessed,
    LedgerUnavailable,
    TransactionNotFound,
    NoMatchingOutput,
    InvalidAmount,
    NotConfirmed,
    StoreFailure,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "InvalidFormat",
            Self::AccountNotFound => "AccountNotFound",
            Self::AddressMismatch => "AddressMismatch",
            Self::AlreadyProcessed => "AlreadyProcessed",
            Self::LedgerUnavailable => "LedgerUnavailable",
            Self::TransactionNotFound => "TransactionNotFound",
            Self::NoMatchingOutput => "NoMatchingOutput",
            Self::InvalidAmount => "InvalidAmount",
            Self::NotConfirmed => "NotConfirmed",
            Self::StoreFailure => "StoreFailure",
        }
    }

    /// Resubmitting the same claim later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable | Self::StoreFailure)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct Rejection {
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Outcome of a successful verification.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditResult {
    pub account_id: AccountId,
    pub transaction_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub credited_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub settlement_delta: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    pub rate_source: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub new_asset_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub new_settlement_balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_validation() {
        let upper = "A1".repeat(32);
        let id = TransactionId::parse(&upper).unwrap();
        assert_eq!(id.as_str(), "a1".repeat(32));
        assert!(id.matches(&upper));

        assert!(TransactionId::parse("").is_err());
        assert!(TransactionId::parse(&"a1".repeat(31)).is_err());
        assert!(TransactionId::parse(&"zz".repeat(32)).is_err());
        assert!(TransactionId::parse(&format!(" {}", "a".repeat(63))).is_err());
    }

    #[test]
    fn test_sats_scaling_is_exact() {
        assert_eq!(sats_to_asset(1_000_000), Decimal::new(1, 2));
        assert_eq!(sats_to_asset(1), Decimal::new(1, 8));
        assert_eq!(sats_to_asset(2_100_000_000_000_000), Decimal::new(21_000_000, 0));
    }

    #[test]
    fn test_amount_paid_to_first_match() {
        let record = TransactionRecord {
            txid: TransactionId::parse(&"ab".repeat(32)).unwrap(),
            outputs: vec![
                TxOutput::from_sats(None, 0),
                TxOutput::from_sats(Some("bc1qother".to_string()), 5),
                TxOutput::from_sats(Some("bc1qmine".to_string()), 1_000_000),
                TxOutput::from_sats(Some("bc1qmine".to_string()), 7),
            ],
            confirmed: true,
        };

        assert_eq!(record.amount_paid_to("bc1qmine"), Some(Decimal::new(1, 2)));
        assert_eq!(record.amount_paid_to("bc1qnobody"), None);
    }

    #[test]
    fn test_rejection_reason_serializes_pascal_case() {
        let json = serde_json::to_string(&RejectionReason::NoMatchingOutput).unwrap();
        assert_eq!(json, "\"NoMatchingOutput\"");
        assert_eq!(RejectionReason::AlreadyProcessed.to_string(), "AlreadyProcessed");
    }
}
