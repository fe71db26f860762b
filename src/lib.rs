//! walletwatch - wallet activity monitor for EVM chains
//!
//! Polls confirmed blocks, picks out transactions touching subscribed
//! wallets, decodes their ERC20 transfers into BUY/SELL events enriched
//! with market data and delivers them to per-wallet callbacks.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fee;
pub mod fetcher;
pub mod filter;
pub mod monitor;
pub mod provider;
pub mod registry;
pub mod rpc;
pub mod shutdown;
pub mod token;
pub mod types;
pub mod units;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export the main types for convenience
pub use config::{FetchFailurePolicy, MissingPricePolicy, MonitorConfig};
pub use dispatch::{bounded_channel_callback, channel_callback};
pub use error::{FetchError, MonitorError};
pub use events::{Operation, TokenInfo, TokenTransfer, TransactionEvent, TxStatus};
pub use monitor::{MonitorService, MonitorState};
pub use provider::ChainProvider;
pub use registry::EventCallback;
pub use rpc::RpcClient;
pub use token::{DexScreenerResolver, TokenInfoResolver};
