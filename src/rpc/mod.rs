// REST API server
pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::account::store::AccountStore;
use crate::error::GateError;
use crate::oracle::service::PaymentVerifier;
use crate::vault::DepositAllocator;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn AccountStore>,
    pub allocator: Arc<DepositAllocator>,
    pub verifier: Arc<PaymentVerifier>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/:id", get(handlers::get_account))
        .route("/accounts/:id/balance", get(handlers::get_balance))
        .route("/payments/verify", post(handlers::verify_payment))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct RpcServer {
    state: ApiState,
    bind_addr: String,
}

impl RpcServer {
    pub fn new(state: ApiState, bind_addr: String) -> Self {
        Self { state, bind_addr }
    }

    pub async fn start(self) -> Result<(), GateError> {
        let app = router(self.state);

        let listener = tokio::net::TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| GateError::Server(format!("failed to bind {}: {}", self.bind_addr, e)))?;

        info!("Deposit gate listening on {}", self.bind_addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| GateError::Server(e.to_string()))
    }
}
