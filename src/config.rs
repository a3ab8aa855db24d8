use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GateConfig {
    pub server: ServerConfig,
    pub wallet: WalletConfig,
    pub ledger: LedgerConfig,
    pub price: PriceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub log_level: String,
}

/// The master key itself never lives in the config file, only the name of
/// the environment variable that carries it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WalletConfig {
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,
}

fn default_master_key_env() -> String {
    "XPUB_KEY".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Blockstream,
    BlockchainInfo,
    Blockcypher,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderEndpoint {
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LedgerConfig {
    pub timeout_secs: u64,
    /// Tried in order until one answers
    pub providers: Vec<ProviderEndpoint>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Coingecko,
    Kraken,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedEndpoint {
    pub kind: FeedKind,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PriceConfig {
    pub timeout_secs: u64,
    /// Lowercase settlement currency code, e.g. "usd"
    pub settlement_currency: String,
    /// Used for a credit when every feed fails
    #[serde(with = "rust_decimal::serde::str")]
    pub fallback_rate: Decimal,
    pub feeds: Vec<FeedEndpoint>,
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PriceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:5000".to_string(),
                db_path: "./data/deposit_gate".to_string(),
                log_level: "info".to_string(),
            },
            wallet: WalletConfig {
                master_key_env: default_master_key_env(),
            },
            ledger: LedgerConfig {
                timeout_secs: 10,
                providers: vec![
                    ProviderEndpoint {
                        kind: ProviderKind::Blockstream,
                        base_url: "https://blockstream.info/api".to_string(),
                        api_key: None,
                    },
                    ProviderEndpoint {
                        kind: ProviderKind::BlockchainInfo,
                        base_url: "https://blockchain.info".to_string(),
                        api_key: None,
                    },
                ],
            },
            price: PriceConfig {
                timeout_secs: 5,
                settlement_currency: "usd".to_string(),
                fallback_rate: Decimal::new(65_000, 0),
                feeds: vec![FeedEndpoint {
                    kind: FeedKind::Coingecko,
                    base_url: "https://api.coingecko.com/api/v3".to_string(),
                }],
            },
        }
    }
}

impl GateConfig {
    /// Load `path`, or write and return the defaults when it does not exist.
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            info!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            match toml::to_string_pretty(&config) {
                Ok(s) => {
                    if let Err(e) = std::fs::write(path, s) {
                        warn!("Could not write default config to {}: {}", path, e);
                    }
                }
                Err(e) => warn!("Could not render default config: {}", e),
            }
            return Ok(config);
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_toml(&raw).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_string(),
                message,
            },
            other => other,
        })?;
        info!("Config loaded from {}", path);
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.providers.is_empty() {
            return Err(ConfigError::Invalid("ledger.providers must not be empty".to_string()));
        }
        if self.ledger.timeout_secs == 0 || self.price.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".to_string()));
        }
        if self.price.fallback_rate <= Decimal::ZERO {
            return Err(ConfigError::Invalid("price.fallback_rate must be positive".to_string()));
        }
        if self.price.settlement_currency.trim().is_empty() {
            return Err(ConfigError::Invalid("price.settlement_currency must be set".to_string()));
        }
        if self.wallet.master_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid("wallet.master_key_env must be set".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = GateConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert_eq!(GateConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            [server]
            bind_addr = "127.0.0.1:8080"
            db_path = "/tmp/gate"
            log_level = "debug"

            [wallet]
            master_key_env = "DEPOSIT_ZPUB"

            [ledger]
            timeout_secs = 8
            providers = [
                { kind = "blockcypher", base_url = "https://api.blockcypher.com/v1/btc/main", api_key = "k" },
                { kind = "blockstream", base_url = "https://blockstream.info/api" },
            ]

            [price]
            timeout_secs = 3
            settlement_currency = "eur"
            fallback_rate = "58000.50"
            feeds = [{ kind = "kraken", base_url = "https://api.kraken.com" }]
        "#;

        let config = GateConfig::from_toml(raw).unwrap();
        assert_eq!(config.wallet.master_key_env, "DEPOSIT_ZPUB");
        assert_eq!(config.ledger.providers[0].kind, ProviderKind::Blockcypher);
        assert_eq!(config.ledger.providers[0].api_key.as_deref(), Some("k"));
        assert_eq!(config.ledger.timeout(), Duration::from_secs(8));
        assert_eq!(config.price.fallback_rate, Decimal::new(5_800_050, 2));
        assert_eq!(config.price.feeds[0].kind, FeedKind::Kraken);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = GateConfig::default();
        config.ledger.providers.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GateConfig::default();
        config.price.fallback_rate = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GateConfig::default();
        config.ledger.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_wallet_env_uses_default() {
        let mut rendered = toml::to_string_pretty(&GateConfig::default()).unwrap();
        rendered = rendered.replace("master_key_env = \"XPUB_KEY\"", "");
        let config = GateConfig::from_toml(&rendered).unwrap();
        assert_eq!(config.wallet.master_key_env, "XPUB_KEY");
    }
}
