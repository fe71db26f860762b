//! Configuration and watchlist loading
//!
//! `MonitorConfig` holds the polling, retry, and decoding knobs of the
//! monitor. It can be built in code (`Default`) or loaded from a JSON file
//! where any missing key falls back to its default. The watchlist is a plain
//! text file with one address per line.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::pad_hex_string;

/// What to do with a block whose fetch keeps failing after every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchFailurePolicy {
    /// Log the loss and advance the cursor past the block.
    Skip,
    /// Keep retrying the same block until it succeeds or shutdown.
    Stall,
}

/// What to do with a transfer whose token has no USD price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPricePolicy {
    /// Emit the transfer with `price = None`.
    Keep,
    /// Leave the transfer out of the event.
    Drop,
}

/// Market-data lookup settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DexScreenerConfig {
    pub base_url: String,
    /// DexScreener chain id used to filter pairs (e.g. "base", "ethereum")
    pub chain_id: String,
    /// Tokens with a pinned USD price (stablecoins)
    pub fixed_prices: HashMap<String, f64>,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com/latest".to_string(),
            chain_id: "base".to_string(),
            fixed_prices: HashMap::new(),
        }
    }
}

/// Monitor configuration. Durations are given in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Blocks to stay behind the reported head
    pub confirmation_lag: u64,
    /// Blocks re-scanned below the head when the loop (re)starts
    pub initial_lookback: u64,
    /// Maximum blocks processed per poll tick
    pub chunk_size: u64,

    pub poll_interval_ms: u64,
    /// Pause between consecutive blocks of one chunk
    pub block_delay_ms: u64,

    /// Attempts per single block/receipt request
    pub fetch_attempts: u32,
    pub fetch_backoff_ms: u64,
    pub fetch_backoff_max_ms: u64,

    /// Whole-block attempts before the failure policy applies
    pub block_attempts: u32,
    pub block_retry_delay_ms: u64,

    pub fetch_failure_policy: FetchFailurePolicy,
    pub missing_price_policy: MissingPricePolicy,

    /// Token contracts whose transfers are never reported
    pub ignored_tokens: Vec<String>,
    /// Only accept logs whose topic0 is the ERC20 Transfer signature
    pub require_transfer_signature: bool,

    pub shutdown_timeout_ms: u64,

    pub dexscreener: DexScreenerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            confirmation_lag: 25,
            initial_lookback: 5,
            chunk_size: 10,
            poll_interval_ms: 3_000,
            block_delay_ms: 100,
            fetch_attempts: 3,
            fetch_backoff_ms: 1_000,
            fetch_backoff_max_ms: 9_000,
            block_attempts: 5,
            block_retry_delay_ms: 1_000,
            fetch_failure_policy: FetchFailurePolicy::Skip,
            missing_price_policy: MissingPricePolicy::Keep,
            ignored_tokens: Vec::new(),
            require_transfer_signature: true,
            shutdown_timeout_ms: 5_000,
            dexscreener: DexScreenerConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid JSON in config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the polling loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }
        if self.fetch_attempts == 0 || self.block_attempts == 0 {
            anyhow::bail!("fetch_attempts and block_attempts must be at least 1");
        }
        for token in &self.ignored_tokens {
            parse_address(token)
                .with_context(|| format!("Invalid address in ignored_tokens: {}", token))?;
        }
        Ok(())
    }

    /// Parsed `ignored_tokens`; entries that fail to parse are skipped.
    pub fn ignored_token_addresses(&self) -> Vec<Address> {
        self.ignored_tokens
            .iter()
            .filter_map(|t| parse_address(t).ok())
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn block_delay(&self) -> Duration {
        Duration::from_millis(self.block_delay_ms)
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }

    pub fn fetch_backoff_max(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_max_ms)
    }

    pub fn block_retry_delay(&self) -> Duration {
        Duration::from_millis(self.block_retry_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Load a watchlist from a file.
///
/// Each line should contain one address in hex format (with or without 0x prefix).
/// Empty lines and lines starting with '#' are ignored.
pub fn load_watchlist(path: &Path) -> Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read watchlist file: {:?}", path))?;

    let mut addresses = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let addr = parse_address(line)
            .with_context(|| format!("Invalid address on line {}: {}", line_num + 1, line))?;

        addresses.push(addr);
    }

    if addresses.is_empty() {
        anyhow::bail!("Watchlist is empty (no valid addresses found)");
    }

    Ok(addresses)
}

/// Parse an address from a hex string, ignoring letter case.
///
/// Accepts addresses with or without 0x prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!(
            "Address must be 20 bytes (40 hex chars), got {} bytes",
            bytes.len()
        );
    }

    Ok(Address::from_slice(&bytes))
}
