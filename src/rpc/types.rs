// Request and response bodies for the REST API
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::types::{Account, AccountId};
use crate::oracle::types::{CreditResult, Rejection, ASSET_TICKER};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: AccountId,
    pub username: String,
    pub deposit_address: String,
    pub derivation_index: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub asset_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub settlement_balance: Decimal,
    pub processed_transaction_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            deposit_address: account.deposit_address,
            derivation_index: account.derivation_index,
            asset_balance: account.balances.asset,
            settlement_balance: account.balances.settlement,
            processed_transaction_ids: account.processed_transaction_ids.into_iter().collect(),
            created_at: account.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    pub username: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub asset_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub settlement_balance: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
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

impl From<CreditResult> for VerifyPaymentResponse {
    fn from(credit: CreditResult) -> Self {
        let message = format!(
            "{} {} ({}) credited",
            credit.credited_amount.round_dp(8),
            ASSET_TICKER,
            credit.settlement_delta.round_dp(2)
        );
        Self {
            success: true,
            message,
            account_id: credit.account_id,
            transaction_id: credit.transaction_id,
            credited_amount: credit.credited_amount,
            settlement_delta: credit.settlement_delta,
            rate: credit.rate,
            rate_source: credit.rate_source,
            new_asset_balance: credit.new_asset_balance,
            new_settlement_balance: credit.new_settlement_balance,
        }
    }
}

/// Body of every non-2xx response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub success: bool,
    pub reason: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(reason: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

impl From<&Rejection> for ErrorBody {
    fn from(rejection: &Rejection) -> Self {
        Self::new(rejection.reason.as_str(), rejection.message.clone())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    pub service: String,
    pub version: String,
    pub network: String,
    pub ledger_providers: Vec<String>,
    pub accounts: u64,
}
