use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::account::store::AccountStore;
use crate::client::price_fetcher::PriceOracle;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::oracle::chains::build_provider;
use crate::oracle::ledger::LedgerClient;
use crate::oracle::service::PaymentVerifier;
use crate::rpc::{ApiState, RpcServer};
use crate::storage::SledAccountStore;
use crate::vault::{DepositAllocator, MasterKey};

fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, GateError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("deposit_gate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GateError::HttpClient(e.to_string()))
}

/// Wire the allocator and verifier around `store` from `config`.
pub fn build_state(config: &GateConfig, key: MasterKey, store: Arc<dyn AccountStore>) -> Result<ApiState, GateError> {
    let ledger_http = http_client(config.ledger.timeout())?;
    let providers = config
        .ledger
        .providers
        .iter()
        .map(|endpoint| build_provider(endpoint, ledger_http.clone()))
        .collect();
    let ledger = LedgerClient::new(providers, config.ledger.timeout());

    let prices = PriceOracle::from_config(&config.price, http_client(config.price.timeout())?);
    if config.price.feeds.is_empty() {
        warn!(
            "No price feeds configured, every credit will use the fallback rate {}",
            config.price.fallback_rate
        );
    }

    Ok(ApiState {
        allocator: Arc::new(DepositAllocator::new(Arc::new(key), store.clone())),
        verifier: Arc::new(PaymentVerifier::new(store.clone(), ledger, prices)),
        store,
    })
}

/// Start the gate. A missing or malformed master key is fatal before the
/// listener is bound.
pub async fn run_server(
    mut config: GateConfig,
    bind: Option<String>,
    db_path: Option<String>,
) -> Result<(), GateError> {
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    if let Some(db_path) = db_path {
        config.server.db_path = db_path;
    }

    let key = MasterKey::from_env(&config.wallet.master_key_env)?;
    info!("Master key loaded: {:?}", key);

    let store = SledAccountStore::open(&config.server.db_path)?;
    info!(
        "Account store opened at {} ({} accounts)",
        config.server.db_path,
        store.account_count()?
    );

    let state = build_state(&config, key, Arc::new(store))?;
    info!("Ledger providers: {}", state.verifier.ledger_providers().join(" -> "));

    RpcServer::new(state, config.server.bind_addr.clone()).start().await
}

pub fn handle_init_config(path: &str, force: bool) -> Result<(), GateError> {
    if Path::new(path).exists() && !force {
        println!("{} already exists (use --force to overwrite)", path);
        return Ok(());
    }
    if force {
        let _ = std::fs::remove_file(path);
    }

    GateConfig::load_or_default(path)?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}
