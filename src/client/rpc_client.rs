// HTTP client for a running deposit gate
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::rpc::types::{AccountView, BalanceResponse, ErrorBody, HealthInfo, VerifyPaymentResponse};

pub struct GateClient {
    base_url: String,
    client: Client,
}

impl GateClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Decode a success body, or turn the gate's error body into a message.
    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(|e| format!("Failed to parse response: {}", e));
        }

        match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(err) => Err(format!("{} ({}): {}", err.reason, status.as_u16(), err.message)),
            Err(_) => Err(format!("HTTP {}", status)),
        }
    }

    pub async fn health(&self) -> Result<HealthInfo, String> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        Self::read(response).await
    }

    pub async fn create_account(&self, username: &str) -> Result<AccountView, String> {
        let response = self
            .client
            .post(format!("{}/accounts", self.base_url))
            .json(&json!({ "username": username }))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        Self::read(response).await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<AccountView, String> {
        let response = self
            .client
            .get(format!("{}/accounts/{}", self.base_url, account_id))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        Self::read(response).await
    }

    pub async fn balance(&self, account_id: &str) -> Result<BalanceResponse, String> {
        let response = self
            .client
            .get(format!("{}/accounts/{}/balance", self.base_url, account_id))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        Self::read(response).await
    }

    pub async fn verify_payment(
        &self,
        transaction_id: &str,
        account_id: &str,
        claimed_address: &str,
    ) -> Result<VerifyPaymentResponse, String> {
        let response = self
            .client
            .post(format!("{}/payments/verify", self.base_url))
            .json(&json!({
                "transactionId": transaction_id,
                "accountId": account_id,
                "claimedAddress": claimed_address,
            }))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        Self::read(response).await
    }
}
