//! Chain data seam
//!
//! The monitor only talks to the chain through `ChainProvider`, so the
//! polling loop can run against a JSON-RPC node or an in-memory fake.

use crate::types::{Block, Receipt};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current head block number.
    async fn get_block_height(&self) -> Result<u64>;

    /// Block with full transaction bodies; `None` if the node does not have it yet.
    async fn get_block(&self, height: u64) -> Result<Option<Block>>;

    /// Receipt for a mined transaction; `None` if not yet indexed.
    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>>;

    /// ERC20 `decimals()` of a token contract.
    async fn get_token_decimals(&self, token: Address) -> Result<u8>;
}
