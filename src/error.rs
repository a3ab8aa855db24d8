use thiserror::Error;

use crate::account::store::StoreError;
use crate::config::ConfigError;
use crate::vault::keys::KeyError;

/// Errors that stop the gate from starting or serving.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Master key error: {0}")]
    MasterKey(#[from] KeyError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("HTTP client error: {0}")]
    HttpClient(String),
    #[error("Server error: {0}")]
    Server(String),
}
