use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::get_json;
use crate::oracle::ledger::{LedgerProvider, ProviderError};
use crate::oracle::types::{TransactionId, TransactionRecord, TxOutput};

/// Bitcoin client using the BlockCypher public API
#[derive(Debug, Clone)]
pub struct BlockCypherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlockCypherTx {
    pub hash: String,
    #[serde(default)]
    pub confirmations: u64,
    pub outputs: Vec<BlockCypherOutput>,
}

#[derive(Debug, Deserialize)]
pub struct BlockCypherOutput {
    pub value: u64, // Satoshis
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
}

impl BlockCypherTx {
    pub fn normalize(self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError> {
        if !txid.matches(&self.hash) {
            return Err(ProviderError::Malformed(format!("unexpected hash {}", self.hash)));
        }

        let outputs = self
            .outputs
            .into_iter()
            .map(|o| {
                // Only single-address outputs carry a usable receive address
                let address = match o.addresses {
                    Some(mut addresses) if addresses.len() == 1 => addresses.pop(),
                    _ => None,
                };
                TxOutput::from_sats(address, o.value)
            })
            .collect();

        Ok(TransactionRecord {
            txid: txid.clone(),
            outputs,
            confirmed: self.confirmations > 0,
        })
    }
}

impl BlockCypherClient {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn tx_url(&self, txid: &TransactionId) -> String {
        let mut url = format!("{}/txs/{}", self.base_url, txid);
        if let Some(key) = &self.api_key {
            url.push_str(&format!("?token={}", key));
        }
        url
    }
}

#[async_trait]
impl LedgerProvider for BlockCypherClient {
    fn name(&self) -> &str {
        "blockcypher"
    }

    async fn fetch(&self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError> {
        let tx: BlockCypherTx = get_json(&self.client, &self.tx_url(txid)).await?;
        tx.normalize(txid)
    }
}
