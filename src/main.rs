//! BLS Wallet Relay CLI
//!
//! Operator commands for inspecting wallets and driving signed invocations.

use bls_wallet_relay::ledger::CallArg;
use bls_wallet_relay::progress::{AuditLogSink, NullSink, ProgressSink};
use bls_wallet_relay::wallet::CustodialSigner;
use bls_wallet_relay::{Config, Error, Network, Result, RpcConfig, SmartWalletService};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "wallet-relay")]
#[command(about = "BLS-aggregated smart wallet relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append progress events to this JSONL file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// Read the current nonce of a wallet contract
    Nonce {
        /// Network (public, testnet)
        #[arg(short, long, default_value = "testnet")]
        network: Network,

        /// Wallet contract id (C...)
        #[arg(short, long)]
        wallet: String,
    },

    /// Collect partial signatures from every signer node and print the aggregate
    Aggregate {
        #[arg(short, long, default_value = "testnet")]
        network: Network,

        #[arg(short, long)]
        wallet: String,

        /// Passkey public key of the wallet owner (hex)
        #[arg(short, long)]
        passkey: String,

        /// Message to sign (hex); defaults to the wallet's current nonce
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Invoke a wallet function authorised by a fresh aggregate signature
    Invoke {
        #[arg(short, long, default_value = "testnet")]
        network: Network,

        #[arg(short, long)]
        wallet: String,

        #[arg(short, long)]
        passkey: String,

        /// Contract function name
        #[arg(short, long)]
        function: String,

        /// Arguments as a JSON array of typed values,
        /// e.g. '[{"type":"address","value":"G..."},{"type":"token_amount","value":"1.5"}]'
        #[arg(short, long, default_value = "[]")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let progress: Arc<dyn ProgressSink> = match &cli.audit_log {
        Some(path) => Arc::new(AuditLogSink::new(path)),
        None => Arc::new(NullSink),
    };

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Nonce { network, wallet } => {
            let service = build_service(&config, progress)?;
            let nonce = service.fetch_nonce(network, &wallet).await?;
            println!("{}", hex::encode(nonce));
        }
        Commands::Aggregate {
            network,
            wallet,
            passkey,
            message,
        } => {
            let service = build_service(&config, progress)?;
            let message = match message {
                Some(raw) => hex::decode(raw.trim_start_matches("0x"))
                    .map_err(|e| Error::InvalidArgument(format!("message: {}", e)))?,
                None => service.fetch_nonce(network, &wallet).await?,
            };
            let signature = service
                .aggregator()
                .aggregate(network, &passkey, &wallet, &message)
                .await?;
            println!("{}", signature.to_hex());
        }
        Commands::Invoke {
            network,
            wallet,
            passkey,
            function,
            args,
        } => {
            let args: Vec<CallArg> = serde_json::from_str(&args)
                .map_err(|e| Error::InvalidArgument(format!("args: {}", e)))?;
            let service = build_service(&config, progress)?;
            let session = uuid::Uuid::new_v4().to_string();
            let outcome = service
                .invoke_signed(&session, network, &passkey, &wallet, &function, args)
                .await?;

            println!("Transaction CONFIRMED");
            println!("  Hash: {}", outcome.hash);
            println!("  Sequence: {}", outcome.sequence);
            println!("  Fee: {}", outcome.fee);
            if outcome.replaced {
                println!("  Replaced by a fee-bump");
            }
            if let Some(value) = outcome.return_value {
                println!("  Return value: {}", serde_json::to_string(&value)?);
            }
        }
    }

    Ok(())
}

fn build_service(config: &Config, progress: Arc<dyn ProgressSink>) -> Result<SmartWalletService> {
    config.validate()?;
    let signer = CustodialSigner::from_env(&config.signer_key_env)?;
    tracing::info!(account = %signer.account_id(), "Loaded custodial signer");

    let rpc = RpcConfig::from_env();
    let service = SmartWalletService::from_config(config, &rpc, Arc::new(signer), progress)?;
    tracing::info!(
        nodes = config.signer_nodes.len(),
        networks = ?service.networks(),
        "Relay ready"
    );
    Ok(service)
}
