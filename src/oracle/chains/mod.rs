//! HTTP ledger providers. Each one owns its response schema and normalizes
//! it into a `TransactionRecord`.

pub mod blockchain_info;
pub mod blockcypher;
pub mod blockstream;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::ledger::{LedgerProvider, ProviderError};
use crate::config::{ProviderEndpoint, ProviderKind};

pub use blockchain_info::BlockchainInfoClient;
pub use blockcypher::BlockCypherClient;
pub use blockstream::BlockstreamClient;

/// Build the provider for one configured endpoint.
pub fn build_provider(endpoint: &ProviderEndpoint, client: Client) -> Arc<dyn LedgerProvider> {
    let base_url = endpoint.base_url.trim_end_matches('/').to_string();
    match endpoint.kind {
        ProviderKind::Blockstream => Arc::new(BlockstreamClient::new(client, base_url)),
        ProviderKind::BlockchainInfo => Arc::new(BlockchainInfoClient::new(client, base_url)),
        ProviderKind::Blockcypher => Arc::new(BlockCypherClient::new(client, base_url, endpoint.api_key.clone())),
    }
}

/// GET `url` and decode the JSON body. 404 maps to `NotFound`.
pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound);
    }
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::Malformed(e.without_url().to_string()))
}
