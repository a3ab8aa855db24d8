use std::fmt;

use bitcoin::base58;
use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::{CompressedPublicKey, Network, NetworkKind};
use thiserror::Error;

/// BIP32 version bytes for mainnet extended public keys.
const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
/// BIP32 version bytes for testnet extended public keys.
const TPUB_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];
/// SLIP-132 native segwit variants, re-versioned before parsing.
const ZPUB_VERSION: [u8; 4] = [0x04, 0xB2, 0x47, 0x46];
const VPUB_VERSION: [u8; 4] = [0x04, 0x5F, 0x1C, 0xF6];

/// Serialized extended key length: version(4) depth(1) fingerprint(4) child(4) chaincode(32) key(33)
const EXTENDED_KEY_LEN: usize = 78;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("master key not set (expected in environment variable {0})")]
    Missing(String),
    #[error("master key is not valid base58check")]
    Encoding,
    #[error("unsupported extended key version {0}")]
    UnsupportedVersion(String),
    #[error("malformed extended public key: {0}")]
    Malformed(String),
    #[error("derivation index {0} is outside the non-hardened range")]
    IndexOutOfRange(u32),
    #[error("child derivation failed: {0}")]
    Derivation(String),
}

/// The process-wide extended public key that every deposit address hangs off.
///
/// Loaded once at startup and never mutated. `Debug` only shows the network
/// and fingerprint so the key cannot leak into logs.
#[derive(Clone)]
pub struct MasterKey {
    xpub: Xpub,
    network: Network,
    secp: Secp256k1<VerifyOnly>,
}

impl MasterKey {
    /// Parse an `xpub`/`zpub` (mainnet) or `tpub`/`vpub` (testnet) string.
    pub fn parse(encoded: &str) -> Result<Self, KeyError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(KeyError::Malformed("empty key".to_string()));
        }

        let mut data = base58::decode_check(encoded).map_err(|_| KeyError::Encoding)?;
        if data.len() != EXTENDED_KEY_LEN {
            return Err(KeyError::Malformed(format!(
                "expected {} bytes, got {}",
                EXTENDED_KEY_LEN,
                data.len()
            )));
        }

        let version = [data[0], data[1], data[2], data[3]];
        let canonical = match version {
            XPUB_VERSION | ZPUB_VERSION => XPUB_VERSION,
            TPUB_VERSION | VPUB_VERSION => TPUB_VERSION,
            other => return Err(KeyError::UnsupportedVersion(hex::encode(other))),
        };
        data[..4].copy_from_slice(&canonical);

        let xpub = Xpub::decode(&data).map_err(|e| KeyError::Malformed(e.to_string()))?;
        let network = match xpub.network {
            NetworkKind::Main => Network::Bitcoin,
            NetworkKind::Test => Network::Testnet,
        };

        Ok(Self {
            xpub,
            network,
            secp: Secp256k1::verification_only(),
        })
    }

    /// Read and parse the key from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self, KeyError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value),
            _ => Err(KeyError::Missing(var.to_string())),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Public key at `m/<branch>/<index>` relative to this key. Both levels are non-hardened.
    pub fn derive_child(&self, branch: u32, index: u32) -> Result<CompressedPublicKey, KeyError> {
        let branch = ChildNumber::from_normal_idx(branch).map_err(|_| KeyError::IndexOutOfRange(branch))?;
        let child = ChildNumber::from_normal_idx(index).map_err(|_| KeyError::IndexOutOfRange(index))?;

        let derived = self
            .xpub
            .derive_pub(&self.secp, &[branch, child])
            .map_err(|e| KeyError::Derivation(e.to_string()))?;

        Ok(CompressedPublicKey(derived.public_key))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("network", &self.network)
            .field("fingerprint", &self.xpub.fingerprint().to_string())
            .finish()
    }
}
