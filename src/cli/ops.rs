use clap::Subcommand;

use crate::client::rpc_client::GateClient;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open an account and print its deposit address
    Create {
        username: String,
        #[arg(long, default_value = super::DEFAULT_GATE_URL)]
        gate_url: String,
    },
    /// Show an account record
    Show {
        id: String,
        #[arg(long, default_value = super::DEFAULT_GATE_URL)]
        gate_url: String,
    },
}

pub async fn handle_account_command(cmd: AccountCommands) {
    match cmd {
        AccountCommands::Create { username, gate_url } => {
            let client = GateClient::new(gate_url);
            match client.create_account(&username).await {
                Ok(account) => {
                    println!("Account created");
                    println!("  ID:              {}", account.id);
                    println!("  Username:        {}", account.username);
                    println!("  Deposit address: {}", account.deposit_address);
                    println!("  Index:           {}", account.derivation_index);
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        AccountCommands::Show { id, gate_url } => {
            let client = GateClient::new(gate_url);
            match client.get_account(&id).await {
                Ok(account) => {
                    println!("{} ({})", account.username, account.id);
                    println!("  Deposit address: {}", account.deposit_address);
                    println!("  Asset balance:   {}", account.asset_balance);
                    println!("  Settlement:      {}", account.settlement_balance);
                    println!("  Credited txs:    {}", account.processed_transaction_ids.len());
                }
                Err(e) => println!("Error: {}", e),
            }
        }
    }
}

pub async fn handle_verify_command(txid: String, account: String, address: String, gate_url: String) {
    let client = GateClient::new(gate_url);
    match client.verify_payment(&txid, &account, &address).await {
        Ok(result) => {
            println!("{}", result.message);
            println!("  Rate:        {} ({})", result.rate, result.rate_source);
            println!("  New balance: {} / {}", result.new_asset_balance, result.new_settlement_balance);
        }
        Err(e) => println!("Rejected: {}", e),
    }
}

pub async fn handle_balance_command(account: String, gate_url: String) {
    let client = GateClient::new(gate_url);
    match client.balance(&account).await {
        Ok(balance) => {
            println!("Balance for {}:", balance.username);
            println!("  Asset:      {}", balance.asset_balance);
            println!("  Settlement: {}", balance.settlement_balance);
        }
        Err(e) => println!("Error: {}", e),
    }
}
