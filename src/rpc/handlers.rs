use super::types::*;
use super::ApiState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::str::FromStr;
use tracing::{debug, error, warn};

use crate::account::store::StoreError;
use crate::account::types::{Account, AccountId};
use crate::oracle::types::{Rejection, RejectionReason, TransactionClaim};

/// Error response: status code plus `{success: false, reason, message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, reason: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(reason, message),
        }
    }

    fn invalid_body(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            RejectionReason::InvalidFormat.as_str(),
            rejection.body_text(),
        )
    }

    fn account_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            RejectionReason::AccountNotFound.as_str(),
            "account not found",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        Self {
            status: status_for(rejection.reason),
            body: ErrorBody::from(&rejection),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound => Self::account_not_found(),
            StoreError::UsernameTaken(_) => Self::new(StatusCode::CONFLICT, "AccountAlreadyExists", err.to_string()),
            StoreError::InvalidUsername(_) => Self::new(
                StatusCode::BAD_REQUEST,
                RejectionReason::InvalidFormat.as_str(),
                err.to_string(),
            ),
            other => {
                error!("Account store error: {}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    RejectionReason::StoreFailure.as_str(),
                    "account store unavailable",
                )
            }
        }
    }
}

/// HTTP status for each rejection reason.
pub fn status_for(reason: RejectionReason) -> StatusCode {
    match reason {
        RejectionReason::InvalidFormat | RejectionReason::AddressMismatch => StatusCode::BAD_REQUEST,
        RejectionReason::AccountNotFound | RejectionReason::TransactionNotFound => StatusCode::NOT_FOUND,
        RejectionReason::AlreadyProcessed | RejectionReason::NotConfirmed => StatusCode::CONFLICT,
        RejectionReason::NoMatchingOutput | RejectionReason::InvalidAmount => StatusCode::UNPROCESSABLE_ENTITY,
        RejectionReason::LedgerUnavailable => StatusCode::FAILED_DEPENDENCY,
        RejectionReason::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn load_account(state: &ApiState, raw_id: &str) -> Result<Account, ApiError> {
    let id = AccountId::from_str(raw_id).map_err(|_| ApiError::account_not_found())?;
    state.store.get(&id)?.ok_or_else(ApiError::account_not_found)
}

pub async fn health(State(state): State<ApiState>) -> Result<Json<HealthInfo>, ApiError> {
    Ok(Json(HealthInfo {
        service: "deposit_gate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: state.allocator.network().to_string(),
        ledger_providers: state
            .verifier
            .ledger_providers()
            .into_iter()
            .map(str::to_string)
            .collect(),
        accounts: state.store.account_count()?,
    }))
}

pub async fn create_account(
    State(state): State<ApiState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccountView>), ApiError> {
    let Json(req) = payload.map_err(ApiError::invalid_body)?;
    debug!("Create account request: username={}", req.username.trim());

    let account = state.allocator.open_account(&req.username)?;
    Ok((StatusCode::CREATED, Json(AccountView::from(account))))
}

pub async fn get_account(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AccountView>, ApiError> {
    Ok(Json(AccountView::from(load_account(&state, &id)?)))
}

pub async fn get_balance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = load_account(&state, &id)?;
    Ok(Json(BalanceResponse {
        success: true,
        username: account.username,
        asset_balance: account.balances.asset,
        settlement_balance: account.balances.settlement,
    }))
}

pub async fn verify_payment(
    State(state): State<ApiState>,
    payload: Result<Json<TransactionClaim>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let Json(claim) = payload.map_err(|e| {
        warn!("Rejected malformed verify request: {}", e.body_text());
        ApiError::invalid_body(e)
    })?;

    let credit = state.verifier.verify_and_credit(&claim).await?;
    Ok(Json(VerifyPaymentResponse::from(credit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::store::{AccountStore, MemoryAccountStore};
    use crate::client::price_fetcher::tests::FakeFeed;
    use crate::client::price_fetcher::{PriceFeed, PriceOracle};
    use crate::oracle::ledger::tests::{record, FakeProvider};
    use crate::oracle::ledger::{LedgerClient, LedgerProvider, ProviderError};
    use crate::oracle::service::PaymentVerifier;
    use crate::oracle::types::TransactionId;
    use crate::rpc::router;
    use crate::vault::keys::tests::BIP84_ZPUB;
    use crate::vault::{DepositAllocator, MasterKey};
    use axum::body::Body;
    use axum::http::{header, Request};
    use rust_decimal::Decimal;
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const FIRST_ADDRESS: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

    fn txid() -> TransactionId {
        TransactionId::parse(&"a1".repeat(32)).unwrap()
    }

    fn state_with(provider: Arc<FakeProvider>) -> ApiState {
        let store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
        let key = Arc::new(MasterKey::parse(BIP84_ZPUB).unwrap());
        let ledger = LedgerClient::new(vec![provider as Arc<dyn LedgerProvider>], Duration::from_millis(200));
        let prices = PriceOracle::new(
            vec![FakeFeed::quoting(Decimal::new(50_000, 0)) as Arc<dyn PriceFeed>],
            Decimal::new(65_000, 0),
            Duration::from_millis(200),
        );

        ApiState {
            allocator: Arc::new(DepositAllocator::new(key, store.clone())),
            verifier: Arc::new(PaymentVerifier::new(store.clone(), ledger, prices)),
            store,
        }
    }

    async fn call(state: &ApiState, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn open(state: &ApiState, username: &str) -> AccountView {
        let (status, body) = call(state, "POST", "/accounts", Some(&format!(r#"{{"username":"{}"}}"#, username))).await;
        assert_eq!(status, StatusCode::CREATED);
        parse(&body)
    }

    fn verify_body(account: &AccountView, txid: &str, address: &str) -> String {
        format!(
            r#"{{"transactionId":"{}","accountId":"{}","claimedAddress":"{}"}}"#,
            txid, account.id, address
        )
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(RejectionReason::InvalidFormat), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(RejectionReason::AccountNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(RejectionReason::AlreadyProcessed), StatusCode::CONFLICT);
        assert_eq!(status_for(RejectionReason::NoMatchingOutput), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(RejectionReason::LedgerUnavailable), StatusCode::FAILED_DEPENDENCY);
        assert!(status_for(RejectionReason::NotConfirmed).is_client_error());
    }

    #[tokio::test]
    async fn test_create_account_assigns_first_address() {
        let state = state_with(FakeProvider::answering("p", Err(ProviderError::NotFound)));

        let account = open(&state, "alice").await;
        assert_eq!(account.deposit_address, FIRST_ADDRESS);
        assert_eq!(account.derivation_index, 0);
        assert_eq!(account.asset_balance, Decimal::ZERO);
        assert!(account.processed_transaction_ids.is_empty());

        let (status, body) = call(&state, "GET", &format!("/accounts/{}", account.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<AccountView>(&body), account);
    }

    #[tokio::test]
    async fn test_duplicate_and_short_usernames() {
        let state = state_with(FakeProvider::answering("p", Err(ProviderError::NotFound)));
        open(&state, "alice").await;

        let (status, body) = call(&state, "POST", "/accounts", Some(r#"{"username":"ALICE"}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(parse::<ErrorBody>(&body).reason, "AccountAlreadyExists");

        let (status, _) = call(&state, "POST", "/accounts", Some(r#"{"username":"al"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_verify_then_replay() {
        let provider = FakeProvider::answering("p", Ok(record(&txid(), FIRST_ADDRESS, 1_000_000, true)));
        let state = state_with(provider);
        let account = open(&state, "alice").await;
        let body = verify_body(&account, txid().as_str(), FIRST_ADDRESS);

        let (status, bytes) = call(&state, "POST", "/payments/verify", Some(&body)).await;
        assert_eq!(status, StatusCode::OK);
        let credited: VerifyPaymentResponse = parse(&bytes);
        assert!(credited.success);
        assert_eq!(credited.credited_amount, Decimal::new(1, 2));
        assert_eq!(credited.settlement_delta, Decimal::new(500, 0));
        assert_eq!(credited.transaction_id, txid().as_str());

        let (status, bytes) = call(&state, "POST", "/payments/verify", Some(&body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let err: ErrorBody = parse(&bytes);
        assert!(!err.success);
        assert_eq!(err.reason, "AlreadyProcessed");

        let (status, bytes) = call(&state, "GET", &format!("/accounts/{}/balance", account.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let balance: BalanceResponse = parse(&bytes);
        assert_eq!(balance.asset_balance, Decimal::new(1, 2));
        assert_eq!(balance.settlement_balance, Decimal::new(500, 0));
        assert_eq!(balance.username, "alice");
    }

    #[tokio::test]
    async fn test_verify_rejections_carry_reason() {
        let provider = FakeProvider::answering("p", Err(ProviderError::Status(502)));
        let state = state_with(provider.clone());
        let account = open(&state, "alice").await;

        let (status, bytes) = call(
            &state,
            "POST",
            "/payments/verify",
            Some(&verify_body(&account, txid().as_str(), FIRST_ADDRESS)),
        )
        .await;
        assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
        assert_eq!(parse::<ErrorBody>(&bytes).reason, "LedgerUnavailable");

        let (status, bytes) = call(
            &state,
            "POST",
            "/payments/verify",
            Some(&verify_body(&account, "not-hex", FIRST_ADDRESS)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse::<ErrorBody>(&bytes).reason, "InvalidFormat");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_invalid_format() {
        let state = state_with(FakeProvider::answering("p", Err(ProviderError::NotFound)));

        let (status, bytes) = call(&state, "POST", "/payments/verify", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse::<ErrorBody>(&bytes).reason, "InvalidFormat");

        let (status, bytes) = call(&state, "POST", "/payments/verify", Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse::<ErrorBody>(&bytes).reason, "InvalidFormat");
    }

    #[tokio::test]
    async fn test_unknown_account_routes() {
        let state = state_with(FakeProvider::answering("p", Err(ProviderError::NotFound)));

        let (status, _) = call(&state, "GET", "/accounts/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, "GET", &format!("/accounts/{}/balance", AccountId::generate()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let state = state_with(FakeProvider::answering("primary", Err(ProviderError::NotFound)));
        open(&state, "alice").await;

        let (status, bytes) = call(&state, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        let info: HealthInfo = parse(&bytes);
        assert_eq!(info.network, "bitcoin");
        assert_eq!(info.ledger_providers, vec!["primary".to_string()]);
        assert_eq!(info.accounts, 1);
    }
}
