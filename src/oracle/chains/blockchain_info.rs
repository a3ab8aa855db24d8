use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::get_json;
use crate::oracle::ledger::{LedgerProvider, ProviderError};
use crate::oracle::types::{TransactionId, TransactionRecord, TxOutput};

/// blockchain.info raw transaction API
#[derive(Debug, Clone)]
pub struct BlockchainInfoClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RawTx {
    pub hash: String,
    pub out: Vec<RawOutput>,
    /// Absent while the transaction sits in the mempool
    #[serde(default)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawOutput {
    #[serde(default)]
    pub addr: Option<String>,
    pub value: u64,
}

impl RawTx {
    pub fn normalize(self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError> {
        if !txid.matches(&self.hash) {
            return Err(ProviderError::Malformed(format!("unexpected hash {}", self.hash)));
        }

        Ok(TransactionRecord {
            txid: txid.clone(),
            outputs: self
                .out
                .into_iter()
                .map(|o| TxOutput::from_sats(o.addr, o.value))
                .collect(),
            confirmed: self.block_height.is_some(),
        })
    }
}

impl BlockchainInfoClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl LedgerProvider for BlockchainInfoClient {
    fn name(&self) -> &str {
        "blockchain_info"
    }

    async fn fetch(&self, txid: &TransactionId) -> Result<TransactionRecord, ProviderError> {
        let url = format!("{}/rawtx/{}?format=json", self.base_url, txid);
        let tx: RawTx = get_json(&self.client, &url).await?;
        tx.normalize(txid)
    }
}
