//! In-memory chain and market data for unit tests

use crate::analyzer::TRANSFER_TOPIC;
use crate::events::TokenInfo;
use crate::provider::ChainProvider;
use crate::token::TokenInfoResolver;
use crate::types::{Block, Log, Receipt, Transaction};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

/// Deterministic transaction hash for a seed.
pub fn tx_hash(seed: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xaa;
    bytes[24..].copy_from_slice(&seed.to_be_bytes());
    B256::from(bytes)
}

/// Legacy transaction paying 20 gwei, no value.
pub fn transfer_tx(seed: u64, from: Address, to: Option<Address>) -> Transaction {
    Transaction {
        hash: tx_hash(seed),
        transaction_index: Some(seed),
        from,
        to,
        value: U256::ZERO,
        gas_price: Some(U256::from(20_000_000_000u64)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
    }
}

pub fn receipt(status: u64, logs: Vec<Log>) -> Receipt {
    Receipt {
        status,
        gas_used: U256::from(50_000u64),
        effective_gas_price: None,
        logs,
    }
}

fn address_topic(address: Address) -> String {
    format!("0x000000000000000000000000{:x}", address)
}

pub fn transfer_log(token: Address, from: Address, to: Address, amount: U256) -> Log {
    Log {
        address: token,
        topics: vec![
            format!("0x{:x}", TRANSFER_TOPIC),
            address_topic(from),
            address_topic(to),
        ],
        data: amount.to_be_bytes::<32>().to_vec(),
    }
}

pub fn block_with(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        timestamp: 1_700_000_000 + number,
        base_fee_per_gas: None,
        transactions,
    }
}

#[derive(Default)]
struct ChainState {
    head: u64,
    head_failures: u32,
    blocks: HashMap<u64, Block>,
    receipts: HashMap<B256, Receipt>,
    decimals: HashMap<Address, u8>,
    block_failures: HashMap<u64, u32>,
    broken_blocks: HashSet<u64>,
    fetched_blocks: Vec<u64>,
    decimals_calls: usize,
    block_latency: Option<Duration>,
}

/// Chain whose head, blocks and failures are set by the test.
///
/// Heights at or below the head without an explicit block return an empty
/// block; heights above the head return `None`.
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                head,
                ..ChainState::default()
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    /// Fail the next `times` head queries.
    pub fn fail_head(&self, times: u32) {
        self.state.lock().head_failures = times;
    }

    /// Append `tx` to the block at `height` and register its receipt.
    pub fn add_tx(&self, height: u64, tx: Transaction, receipt: Receipt) {
        let mut state = self.state.lock();
        state.receipts.insert(tx.hash, receipt);
        state
            .blocks
            .entry(height)
            .or_insert_with(|| block_with(height, Vec::new()))
            .transactions
            .push(tx);
    }

    /// Fail the next `times` fetches of the block at `height`.
    pub fn fail_block(&self, height: u64, times: u32) {
        self.state.lock().block_failures.insert(height, times);
    }

    pub fn fail_block_always(&self, height: u64) {
        self.state.lock().broken_blocks.insert(height);
    }

    pub fn heal_block(&self, height: u64) {
        let mut state = self.state.lock();
        state.broken_blocks.remove(&height);
        state.block_failures.remove(&height);
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.state.lock().decimals.insert(token, decimals);
    }

    pub fn clear_decimals(&self, token: Address) {
        self.state.lock().decimals.remove(&token);
    }

    pub fn decimals_calls(&self) -> usize {
        self.state.lock().decimals_calls
    }

    /// Make every block fetch take `latency` before answering.
    pub fn set_block_latency(&self, latency: Duration) {
        self.state.lock().block_latency = Some(latency);
    }

    /// Every block height requested so far, in request order.
    pub fn fetched_blocks(&self) -> Vec<u64> {
        self.state.lock().fetched_blocks.clone()
    }
}

#[async_trait]
impl ChainProvider for FakeChain {
    async fn get_block_height(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.head_failures > 0 {
            state.head_failures -= 1;
            anyhow::bail!("head query failed");
        }
        Ok(state.head)
    }

    async fn get_block(&self, height: u64) -> Result<Option<Block>> {
        let latency = self.state.lock().block_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        state.fetched_blocks.push(height);

        if state.broken_blocks.contains(&height) {
            anyhow::bail!("block {} unavailable", height);
        }
        if let Some(remaining) = state.block_failures.get_mut(&height) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("block {} temporarily unavailable", height);
            }
        }
        if height > state.head {
            return Ok(None);
        }
        Ok(Some(
            state
                .blocks
                .get(&height)
                .cloned()
                .unwrap_or_else(|| block_with(height, Vec::new())),
        ))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn get_token_decimals(&self, token: Address) -> Result<u8> {
        let mut state = self.state.lock();
        state.decimals_calls += 1;
        match state.decimals.get(&token) {
            Some(decimals) => Ok(*decimals),
            None => anyhow::bail!("execution reverted"),
        }
    }
}

/// Market data keyed by token address.
#[derive(Default)]
pub struct FakeResolver {
    infos: Mutex<HashMap<Address, TokenInfo>>,
    failing: Mutex<HashSet<Address>>,
    latency: Mutex<Option<Duration>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, token: Address, symbol: &str, price: &str) {
        let info = TokenInfo {
            symbol: symbol.to_string(),
            price: Some(Decimal::from_str(price).unwrap()),
            ..TokenInfo::unknown(token)
        };
        self.infos.lock().insert(token, info);
    }

    /// Make every lookup take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Make lookups of `token` return an error.
    pub fn fail(&self, token: Address) {
        self.failing.lock().insert(token);
    }
}

#[async_trait]
impl TokenInfoResolver for FakeResolver {
    async fn get_token_info(&self, token: Address) -> Result<Option<TokenInfo>> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().contains(&token) {
            anyhow::bail!("market data unavailable");
        }
        Ok(self.infos.lock().get(&token).cloned())
    }
}
