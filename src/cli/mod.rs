pub mod keys;
pub mod node;
pub mod ops;

use clap::{Parser, Subcommand};

pub const DEFAULT_GATE_URL: &str = "http://localhost:5000";

#[derive(Parser)]
#[command(name = "deposit_gate")]
#[command(about = "Bitcoin deposit address allocation and payment verification", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "deposit_gate.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default when no command is given)
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Print deposit addresses derived from the master key
    Derive {
        #[arg(long, default_value = "0")]
        index: u32,
        #[arg(long, default_value = "1")]
        count: u32,
    },
    /// Write the default configuration file
    InitConfig {
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// Account management against a running gate
    Account {
        #[command(subcommand)]
        cmd: ops::AccountCommands,
    },
    /// Submit a deposit claim to a running gate
    Verify {
        #[arg(long)]
        txid: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        address: String,
        #[arg(long, default_value = DEFAULT_GATE_URL)]
        gate_url: String,
    },
    /// Show an account's balances
    Balance {
        account: String,
        #[arg(long, default_value = DEFAULT_GATE_URL)]
        gate_url: String,
    },
}
