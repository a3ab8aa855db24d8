use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::get_json;
use crate::oracle::ledger::{LedgerProvider, ProviderError};
use crate::oracle::types::{TransactionId, TransactionRecord, TxOutput};

/// Esplora-style API (blockstream.info, mempool.space)
#[derive(Debug, Clone)]
pub struct BlockstreamClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct EsploraTx {
    pub txid: String,
    pub vout: Vec<EsploraOutput>,
    pub status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
pub struct EsploraOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub struct EsploraStatus {
    pub confirmed: bool,
}

impl EsploraTx {
    pub fn normalize(self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError> {
        if !txid.matches(&self.txid) {
            return Err(ProviderError::Malformed(format!("unexpected txid {}", self.txid)));
        }

        Ok(TransactionRecord {
            txid: txid.clone(),
            outputs: self
                .vout
                .into_iter()
                .map(|o| TxOutput::from_sats(o.scriptpubkey_address, o.value))
                .collect(),
            confirmed: self.status.confirmed,
        })
    }
}

impl BlockstreamClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl LedgerProvider for BlockstreamClient {
    fn name(&self) -> &str {
        "blockstream"
    }

    async fn fetch(&self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError> {
        let url = format!("{}/tx/{}", self.base_url, txid);
        let tx: EsploraTx = get_json(&self.client, &url).await?;
        tx.normalize(txid)
    }
}
