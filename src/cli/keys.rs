use crate::config::GateConfig;
use crate::error::GateError;
use crate::vault::{derive_address, DepositAddress, KeyError, MasterKey, DEPOSIT_BRANCH};

/// Addresses for `count` consecutive indices starting at `start`.
pub fn derive_range(key: &MasterKey, start: u32, count: u32) -> Result<Vec<DepositAddress>, GateError> {
    let mut out = Vec::with_capacity(count as usize);
    for offset in 0..count {
        let index = start.checked_add(offset).ok_or(KeyError::IndexOutOfRange(u32::MAX))?;
        out.push(derive_address(key, index)?);
    }
    Ok(out)
}

pub fn handle_derive(config: &GateConfig, start: u32, count: u32) -> Result<(), GateError> {
    let key = MasterKey::from_env(&config.wallet.master_key_env)?;
    println!("Master key: {:?}", key);

    for derived in derive_range(&key, start, count)? {
        println!(
            "m/{}/{:<6} {}  {}",
            DEPOSIT_BRANCH, derived.index, derived.address, derived.public_key
        );
    }
    Ok(())
}
