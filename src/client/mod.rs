// Client module
pub mod price_fetcher;
pub mod rpc_client;

pub use price_fetcher::{PriceFeed, PriceOracle, RateQuote, RateSource};
pub use rpc_client::GateClient;
