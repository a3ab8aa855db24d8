use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use deposit_gate::cli::{self, Cli, Commands};
use deposit_gate::config::GateConfig;
use deposit_gate::error::GateError;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<(), GateError> {
    let command = cli.command.unwrap_or(Commands::Serve {
        bind: None,
        db_path: None,
    });

    match command {
        Commands::InitConfig { force } => {
            init_tracing("info");
            cli::node::handle_init_config(&cli.config, force)
        }
        Commands::Serve { bind, db_path } => {
            let config = GateConfig::load_or_default(&cli.config)?;
            init_tracing(&config.server.log_level);
            cli::node::run_server(config, bind, db_path).await
        }
        Commands::Derive { index, count } => {
            let config = GateConfig::load_or_default(&cli.config)?;
            init_tracing(&config.server.log_level);
            cli::keys::handle_derive(&config, index, count)
        }
        Commands::Account { cmd } => {
            init_tracing("warn");
            cli::ops::handle_account_command(cmd).await;
            Ok(())
        }
        Commands::Verify {
            txid,
            account,
            address,
            gate_url,
        } => {
            init_tracing("warn");
            cli::ops::handle_verify_command(txid, account, address, gate_url).await;
            Ok(())
        }
        Commands::Balance { account, gate_url } => {
            init_tracing("warn");
            cli::ops::handle_balance_command(account, gate_url).await;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
