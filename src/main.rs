//! DidLab badge scripts - deploy the DidLabBadge contract, mint badges, and
//! replace stuck mints with a higher gas price.
//!
//! Settings are loaded and validated once, before any RPC traffic. Results are
//! printed to stdout; progress logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod chain;
mod config;
mod contract;
mod error;
mod tx;

use chain::ChainProvider;
use config::{MintTarget, ReplacementTarget, Settings};
use contract::ContractArtifact;
use tx::{BadgeSender, GasEstimator, MintOutcome};

#[derive(Parser)]
#[command(name = "didlab-badge", version)]
#[command(about = "Deploy and mint DidLabBadge tokens", long_about = None)]
struct Cli {
    /// Settings file (defaults to config/default.toml)
    #[arg(short, long, env = "BADGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy the DidLabBadge contract with the signer as owner
    Deploy {
        /// Hardhat artifact JSON (overrides badge.artifact_path)
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Mint a badge to the signer at a bumped gas price
    Mint {
        /// Token metadata URI (overrides TOKEN_URI)
        #[arg(long)]
        uri: Option<String>,
    },
    /// Replace a pending mint: same nonce, higher gas price
    Replace {
        /// Token metadata URI (overrides TOKEN_URI)
        #[arg(long)]
        uri: Option<String>,
        /// Nonce of the stuck transaction (overrides NONCE)
        #[arg(long)]
        nonce: Option<u64>,
        /// Gas price in gwei (overrides GAS_GWEI)
        #[arg(long)]
        gas_gwei: Option<u64>,
    },
}

/// A command with its inputs already validated
enum Plan {
    Deploy(ContractArtifact),
    Mint(MintTarget),
    Replace(ReplacementTarget),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting didlab-badge v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(cli.config.as_deref())?;
    let plan = plan(&settings, cli.command)?;
    let private_key = settings.private_key()?;

    let provider = Arc::new(
        ChainProvider::connect(
            settings.network.clone(),
            &private_key,
            settings.confirmation.poll_interval(),
        )
        .await?,
    );
    info!(
        "Using {:?} on {} (chain {})",
        provider.signer_address(),
        provider.network_name(),
        provider.chain_id()
    );

    let sender = BadgeSender::new(
        provider,
        GasEstimator::new(&settings.gas),
        settings.confirmation.clone(),
    );

    match plan {
        Plan::Deploy(artifact) => {
            let outcome = sender.deploy(&artifact).await?;
            println!("Deployer:  {:?}", outcome.deployer);
            println!("Tx hash:   {:?}", outcome.tx_hash);
            if let Some(block) = outcome.block_number {
                println!("Block:     {}", block);
            }
            println!("{} deployed to: {:?}", artifact.contract_name, outcome.address);
        }
        Plan::Mint(target) => {
            let outcome = sender.mint(&target).await?;
            report_mint(&outcome);
        }
        Plan::Replace(target) => {
            let outcome = sender.replace(&target).await?;
            report_mint(&outcome);
        }
    }

    Ok(())
}

/// Validate everything a command needs before connecting
fn plan(settings: &Settings, command: Command) -> Result<Plan> {
    let plan = match command {
        Command::Deploy { artifact } => {
            let path = match artifact {
                Some(path) => path,
                None => settings.artifact_path()?,
            };
            Plan::Deploy(ContractArtifact::load(&path)?)
        }
        Command::Mint { uri } => Plan::Mint(settings.mint_target(uri.as_deref())?),
        Command::Replace {
            uri,
            nonce,
            gas_gwei,
        } => Plan::Replace(settings.replacement_target(uri.as_deref(), nonce, gas_gwei)?),
    };
    Ok(plan)
}

fn report_mint(outcome: &MintOutcome) {
    if outcome.reverted() {
        warn!("Transaction {:?} reverted", outcome.tx_hash);
    }

    let block = outcome
        .block_number
        .map(|b| b.to_string())
        .unwrap_or_else(|| "pending".to_string());
    let status = outcome
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("Transaction hash: {:?}", outcome.tx_hash);
    println!("Confirmed in block: {}  status: {}", block, status);
    if let Some(id) = outcome.token_id {
        println!("tokenId: {}", id);
    }
    if let Some(uri) = &outcome.token_uri {
        println!("tokenURI: {}", uri);
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,didlab_badge=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
