//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to Ethereum JSON-RPC endpoints and implements
//! `ChainProvider` on top of it. Retries are not handled here; the block
//! fetcher owns the retry policy.

use crate::provider::ChainProvider;
use crate::types::{parse_hex_u64, pad_hex_string, Block, Receipt};
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Selector of `decimals()` (first 4 bytes of its keccak256).
const DECIMALS_SELECTOR: &str = "0x313ce567";

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url }
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?
            .error_for_status()
            .with_context(|| format!("{} request rejected", method))?;

        let json: Value = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number = result
            .as_str()
            .context("Block number response is not a string")?;
        parse_hex_u64(number).context("Failed to parse block number")
    }

    /// Get a block by number with full transaction details.
    ///
    /// Returns `None` when the node answers `null` (block not available yet).
    pub async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        let params = json!([format!("0x{:x}", number), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .with_context(|| format!("Failed to deserialize block {}", number))
    }

    /// Get a transaction receipt by hash.
    pub async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let params = json!([format!("0x{:x}", tx_hash)]);
        let result = self.call("eth_getTransactionReceipt", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .with_context(|| format!("Failed to deserialize receipt {:?}", tx_hash))
    }

    /// Call `decimals()` on an ERC20 contract at the latest block.
    pub async fn get_decimals(&self, token: Address) -> Result<u8> {
        let params = json!([
            { "to": format!("0x{:x}", token), "data": DECIMALS_SELECTOR },
            "latest"
        ]);
        let result = self.call("eth_call", params).await?;
        let word = result
            .as_str()
            .context("eth_call response is not a string")?;
        decode_decimals_word(word)
            .with_context(|| format!("Invalid decimals() return from {:?}", token))
    }
}

/// Decode the ABI-encoded `uint8` returned by `decimals()`.
fn decode_decimals_word(word: &str) -> Result<u8> {
    let s = word.strip_prefix("0x").unwrap_or(word);
    if s.is_empty() {
        anyhow::bail!("empty return data (not a contract?)");
    }
    let bytes = hex::decode(pad_hex_string(s)).context("Failed to decode return hex")?;
    let value = U256::try_from_be_slice(&bytes).context("Return data wider than 32 bytes")?;
    if value > U256::from(u8::MAX) {
        anyhow::bail!("decimals {} out of range", value);
    }
    Ok(value.to::<u8>())
}

#[async_trait]
impl ChainProvider for RpcClient {
    async fn get_block_height(&self) -> Result<u64> {
        self.get_block_number().await
    }

    async fn get_block(&self, height: u64) -> Result<Option<Block>> {
        self.get_block_by_number(height).await
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        RpcClient::get_transaction_receipt(self, hash).await
    }

    async fn get_token_decimals(&self, token: Address) -> Result<u8> {
        self.get_decimals(token).await
    }
}
