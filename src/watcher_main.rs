//! Wallet activity watcher binary
//!
//! Subscribes every address of a watchlist and prints a notification for
//! each decoded BUY/SELL transaction until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walletwatch::config::load_watchlist;
use walletwatch::{channel_callback, DexScreenerResolver, MonitorConfig, MonitorService, RpcClient};

/// Wallet activity watcher
#[derive(Parser)]
#[command(name = "watcher")]
#[command(about = "Report ERC20 buys and sells of watched wallets from confirmed blocks")]
struct Args {
    /// RPC endpoint URL (e.g., https://mainnet.base.org)
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Path to watchlist file (one address per line)
    #[arg(short, long, default_value = "watchlist.txt")]
    watchlist: PathBuf,

    /// Path to a JSON monitor config (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print one-line notifications instead of the full report
    #[arg(short, long)]
    brief: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting wallet watcher");
    info!("RPC URL: {}", args.rpc_url);
    info!("Watchlist: {:?}", args.watchlist);

    let config = match &args.config {
        Some(path) => MonitorConfig::from_json_file(path)?,
        None => MonitorConfig::default(),
    };
    let wallets = load_watchlist(&args.watchlist)?;
    info!("Loaded {} addresses to watch", wallets.len());

    let resolver = DexScreenerResolver::new(&config.dexscreener)
        .context("Failed to create market data client")?;
    let monitor = MonitorService::new(
        Arc::new(RpcClient::new(args.rpc_url)),
        Arc::new(resolver),
        config,
    )?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    for wallet in wallets {
        monitor.subscribe_callback(&format!("0x{:x}", wallet), channel_callback(wallet, tx.clone()))?;
    }
    drop(tx);

    let brief = args.brief;
    let printer = async {
        while let Some((wallet, event)) = rx.recv().await {
            if brief {
                println!("{}", event.format_brief());
            } else {
                println!("Wallet 0x{:x}", wallet);
                println!("{}", event.format_full());
            }
        }
    };

    // Handle Ctrl+C gracefully
    tokio::select! {
        _ = printer => {
            warn!("Event channel closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    monitor.shutdown().await.context("Monitor shutdown failed")?;
    info!("Watcher stopped");
    Ok(())
}
