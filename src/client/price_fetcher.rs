use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{FeedEndpoint, FeedKind, PriceConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    #[error("unsupported ticker {0}")]
    UnsupportedTicker(String),
    #[error("price request failed: {0}")]
    Transport(String),
    #[error("price feed returned HTTP {0}")]
    Status(u16),
    #[error("unparseable price: {0}")]
    Malformed(String),
    #[error("price feed timed out")]
    Timeout,
    #[error("non-positive price {0}")]
    NonPositive(Decimal),
}

/// Where the rate used for a credit came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateSource {
    Feed(String),
    Fallback,
}

impl std::fmt::Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateSource::Feed(name) => write!(f, "feed:{}", name),
            RateSource::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub ticker: String,
    pub rate: Decimal,
    pub source: RateSource,
}

/// A single exchange-rate source quoting `ticker` in the settlement currency.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_rate(&self, ticker: &str) -> Result<Decimal, PriceError>;
}

fn parse_price(raw: &str) -> Result<Decimal, PriceError> {
    Decimal::from_str(raw).map_err(|_| PriceError::Malformed(raw.to_string()))
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T, PriceError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| PriceError::Transport(e.without_url().to_string()))?;

    if !resp.status().is_success() {
        return Err(PriceError::Status(resp.status().as_u16()));
    }

    resp.json::<T>()
        .await
        .map_err(|e| PriceError::Malformed(e.without_url().to_string()))
}

/// CoinGecko simple price API
pub struct CoinGeckoFeed {
    client: Client,
    base_url: String,
    vs_currency: String,
}

impl CoinGeckoFeed {
    pub fn new(client: Client, base_url: String, vs_currency: String) -> Self {
        Self {
            client,
            base_url,
            vs_currency: vs_currency.to_lowercase(),
        }
    }

    fn coin_id(ticker: &str) -> Result<&'static str, PriceError> {
        match ticker {
            "BTC" => Ok("bitcoin"),
            "LTC" => Ok("litecoin"),
            _ => Err(PriceError::UnsupportedTicker(ticker.to_string())),
        }
    }

    /// Extract the quote from a `{"bitcoin": {"usd": 65000.12}}` body.
    fn extract(
        body: &HashMap<String, HashMap<String, f64>>,
        coin_id: &str,
        vs_currency: &str,
    ) -> Result<Decimal, PriceError> {
        let price = body
            .get(coin_id)
            .and_then(|quotes| quotes.get(vs_currency))
            .ok_or_else(|| PriceError::Malformed(format!("no {} quote for {}", vs_currency, coin_id)))?;

        // Via the shortest decimal representation, not the binary value
        parse_price(&price.to_string())
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_rate(&self, ticker: &str) -> Result<Decimal, PriceError> {
        let coin_id = Self::coin_id(ticker)?;
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, coin_id, self.vs_currency
        );

        let body: HashMap<String, HashMap<String, f64>> = get_json(&self.client, &url).await?;
        Self::extract(&body, coin_id, &self.vs_currency)
    }
}

/// Kraken public ticker API
pub struct KrakenFeed {
    client: Client,
    base_url: String,
    vs_currency: String,
}

#[derive(Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

#[derive(Deserialize)]
struct KrakenTicker {
    c: Vec<String>, // Last trade closed array [price, lot volume]
}

impl KrakenFeed {
    pub fn new(client: Client, base_url: String, vs_currency: String) -> Self {
        Self {
            client,
            base_url,
            vs_currency: vs_currency.to_uppercase(),
        }
    }

    fn pair(&self, ticker: &str) -> Result<String, PriceError> {
        let base = match ticker {
            "BTC" => "XBT",
            "LTC" => "LTC",
            _ => return Err(PriceError::UnsupportedTicker(ticker.to_string())),
        };
        Ok(format!("{}{}", base, self.vs_currency))
    }

    fn extract(body: KrakenResponse) -> Result<Decimal, PriceError> {
        if !body.error.is_empty() {
            return Err(PriceError::Malformed(body.error.join("; ")));
        }
        // One pair requested, so one entry; Kraken renames the key (XBTUSD -> XXBTZUSD)
        let ticker = body
            .result
            .values()
            .next()
            .ok_or_else(|| PriceError::Malformed("empty result".to_string()))?;
        let price = ticker
            .c
            .first()
            .ok_or_else(|| PriceError::Malformed("no last trade".to_string()))?;
        parse_price(price)
    }
}

#[async_trait]
impl PriceFeed for KrakenFeed {
    fn name(&self) -> &str {
        "kraken"
    }

    async fn fetch_rate(&self, ticker: &str) -> Result<Decimal, PriceError> {
        let url = format!("{}/0/public/Ticker?pair={}", self.base_url, self.pair(ticker)?);
        let body: KrakenResponse = get_json(&self.client, &url).await?;
        Self::extract(body)
    }
}

pub fn build_feed(endpoint: &FeedEndpoint, client: Client, vs_currency: &str) -> Arc<dyn PriceFeed> {
    let base_url = endpoint.base_url.trim_end_matches('/').to_string();
    match endpoint.kind {
        FeedKind::Coingecko => Arc::new(CoinGeckoFeed::new(client, base_url, vs_currency.to_string())),
        FeedKind::Kraken => Arc::new(KrakenFeed::new(client, base_url, vs_currency.to_string())),
    }
}

/// Rate lookup that never fails: feeds are tried in order and the pinned
/// fallback rate is used when none answers in time.
pub struct PriceOracle {
    feeds: Vec<Arc<dyn PriceFeed>>,
    fallback_rate: Decimal,
    timeout: Duration,
}

impl PriceOracle {
    pub fn new(feeds: Vec<Arc<dyn PriceFeed>>, fallback_rate: Decimal, timeout: Duration) -> Self {
        Self {
            feeds,
            fallback_rate,
            timeout,
        }
    }

    pub fn from_config(config: &PriceConfig, client: Client) -> Self {
        let feeds = config
            .feeds
            .iter()
            .map(|endpoint| build_feed(endpoint, client.clone(), &config.settlement_currency))
            .collect();
        Self::new(feeds, config.fallback_rate, config.timeout())
    }

    pub fn fallback_rate(&self) -> Decimal {
        self.fallback_rate
    }

    pub async fn current_rate(&self, ticker: &str) -> RateQuote {
        for feed in &self.feeds {
            let result = match tokio::time::timeout(self.timeout, feed.fetch_rate(ticker)).await {
                Ok(result) => result,
                Err(_) => Err(PriceError::Timeout),
            };

            match result.and_then(|rate| {
                if rate > Decimal::ZERO {
                    Ok(rate)
                } else {
                    Err(PriceError::NonPositive(rate))
                }
            }) {
                Ok(rate) => {
                    debug!(feed = feed.name(), ticker, %rate, "price feed answered");
                    return RateQuote {
                        ticker: ticker.to_string(),
                        rate,
                        source: RateSource::Feed(feed.name().to_string()),
                    };
                }
                Err(e) => warn!(feed = feed.name(), ticker, error = %e, "price feed failed"),
            }
        }

        warn!(ticker, rate = %self.fallback_rate, "all price feeds failed, using fallback rate");
        RateQuote {
            ticker: ticker.to_string(),
            rate: self.fallback_rate,
            source: RateSource::Fallback,
        }
    }
}
