//! Decimal balance tracking for deposit accounts

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-account balances. Both only ever grow.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Balances {
    /// Deposited asset, in display units (BTC, not satoshis)
    #[serde(with = "rust_decimal::serde::str")]
    pub asset: Decimal,
    /// Settlement currency value accumulated at each deposit's rate
    #[serde(with = "rust_decimal::serde::str")]
    pub settlement: Decimal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("credit amount must be positive")]
    InvalidAmount,
    #[error("balance overflow")]
    Overflow,
}

impl Balances {
    /// Credit both balances together. Nothing changes on error.
    pub fn credit(&mut self, asset: Decimal, settlement: Decimal) -> Result<(), BalanceError> {
        if asset <= Decimal::ZERO || settlement < Decimal::ZERO {
            return Err(BalanceError::InvalidAmount);
        }

        let new_asset = self.asset.checked_add(asset).ok_or(BalanceError::Overflow)?;
        let new_settlement = self
            .settlement
            .checked_add(settlement)
            .ok_or(BalanceError::Overflow)?;

        self.asset = new_asset;
        self.settlement = new_settlement;
        Ok(())
    }
}
