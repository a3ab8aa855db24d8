pub mod account;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod oracle;
pub mod rpc;
pub mod storage;
pub mod vault;
