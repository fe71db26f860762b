//! ERC20 Transfer decoding and transaction analysis
//!
//! Turns a matched transaction and its receipt into a `TransactionEvent`.
//! A log is a transfer when it carries exactly three topics (signature,
//! indexed `from`, indexed `to`) and its data is the big-endian amount.
//! Each transfer is classified relative to the transaction sender: the
//! sender giving a token away is a SELL, anything else is a BUY.
//!
//! Failures are isolated per log: a malformed log, a failed decimals lookup
//! or a failed price lookup only affects that transfer.

use crate::cache::DecimalsCache;
use crate::config::{MissingPricePolicy, MonitorConfig};
use crate::events::{Operation, TokenInfo, TokenTransfer, TransactionEvent, TxStatus};
use crate::fee::gas_summary;
use crate::provider::ChainProvider;
use crate::token::TokenInfoResolver;
use crate::types::{pad_hex_string, Block, Log, Receipt, Transaction};
use crate::units::{to_decimal, wei_to_native};
use alloy_primitives::{b256, Address, B256, U256};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// A transfer as it appears in the log, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// Decode a receipt log as an ERC20 Transfer.
///
/// `Ok(None)` means the log is some other event; `Err` means it looked like
/// a transfer but could not be decoded.
pub fn decode_transfer_log(log: &Log, require_signature: bool) -> Result<Option<RawTransfer>> {
    if log.topics.len() != 3 {
        return Ok(None);
    }
    if require_signature && parse_topic(&log.topics[0])? != TRANSFER_TOPIC {
        return Ok(None);
    }

    let from = address_from_topic(&log.topics[1]).context("Invalid 'from' topic")?;
    let to = address_from_topic(&log.topics[2]).context("Invalid 'to' topic")?;

    if log.data.is_empty() {
        anyhow::bail!("Transfer log has no amount data");
    }
    let amount =
        U256::try_from_be_slice(&log.data).context("Transfer amount wider than 256 bits")?;

    Ok(Some(RawTransfer {
        token: log.address,
        from,
        to,
        amount,
    }))
}

fn parse_topic(topic: &str) -> Result<B256> {
    let s = topic.strip_prefix("0x").unwrap_or(topic);
    let bytes = hex::decode(pad_hex_string(s)).context("Invalid hex in topic")?;
    if bytes.len() != 32 {
        anyhow::bail!("Topic must be 32 bytes, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

/// Low 20 bytes of a 32-byte topic.
fn address_from_topic(topic: &str) -> Result<Address> {
    let word = parse_topic(topic)?;
    Ok(Address::from_slice(&word[12..]))
}

/// Classify a transfer relative to the transaction sender.
pub fn classify(transfer_from: Address, tx_sender: Address) -> Operation {
    if transfer_from == tx_sender {
        Operation::Sell
    } else {
        Operation::Buy
    }
}

/// Builds transaction events, enriching transfers with decimals and market data.
pub struct TransactionAnalyzer {
    provider: Arc<dyn ChainProvider>,
    resolver: Arc<dyn TokenInfoResolver>,
    decimals: DecimalsCache,
    ignored_tokens: HashSet<Address>,
    price_policy: MissingPricePolicy,
    require_signature: bool,
}

impl TransactionAnalyzer {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        resolver: Arc<dyn TokenInfoResolver>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            provider,
            resolver,
            decimals: DecimalsCache::new(),
            ignored_tokens: config.ignored_token_addresses().into_iter().collect(),
            price_policy: config.missing_price_policy,
            require_signature: config.require_transfer_signature,
        }
    }

    /// Analyze one transaction.
    ///
    /// Returns `Ok(None)` when no transfer survives decoding and filtering;
    /// that is a normal outcome, not an error.
    pub async fn analyze(
        &mut self,
        block: &Block,
        tx: &Transaction,
        receipt: &Receipt,
    ) -> Result<Option<TransactionEvent>> {
        let transfers = self.decode_transfers(tx, receipt).await;
        if transfers.is_empty() {
            debug!(tx = ?tx.hash, block = block.number, "no token transfers to report");
            return Ok(None);
        }

        let gas = gas_summary(tx, receipt, block).context("Failed to compute gas cost")?;
        let native_value = wei_to_native(tx.value).context("Failed to convert native value")?;

        Ok(Some(TransactionEvent {
            hash: tx.hash,
            block_number: block.number,
            timestamp: block.timestamp,
            from_address: tx.from,
            to_address: tx.to,
            native_value,
            gas_used: gas.gas_used,
            gas_price: gas.gas_price,
            gas_cost: gas.gas_cost,
            status: if receipt.is_success() {
                TxStatus::Success
            } else {
                TxStatus::Failed
            },
            transfers,
        }))
    }

    /// Decode, deduplicate and enrich the transfers of a receipt in log order.
    async fn decode_transfers(&mut self, tx: &Transaction, receipt: &Receipt) -> Vec<TokenTransfer> {
        let mut seen_tokens = HashSet::new();
        let mut transfers = Vec::new();

        for (index, log) in receipt.logs.iter().enumerate() {
            let raw = match decode_transfer_log(log, self.require_signature) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tx = ?tx.hash, log_index = index, error = %e, "skipping malformed transfer log");
                    continue;
                }
            };

            if self.ignored_tokens.contains(&raw.token) {
                continue;
            }
            // First transfer of a token wins
            if !seen_tokens.insert(raw.token) {
                continue;
            }

            if let Some(transfer) = self.enrich(tx, raw).await {
                transfers.push(transfer);
            }
        }

        transfers
    }

    async fn enrich(&mut self, tx: &Transaction, raw: RawTransfer) -> Option<TokenTransfer> {
        let decimals = self.decimals.resolve(self.provider.as_ref(), raw.token).await;
        let amount = match to_decimal(raw.amount, decimals) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(tx = ?tx.hash, token = %raw.token, error = %e, "skipping transfer with unrepresentable amount");
                return None;
            }
        };

        let info = match self.resolver.get_token_info(raw.token).await {
            Ok(info) => info,
            Err(e) => {
                warn!(token = %raw.token, error = %e, "token info lookup failed");
                None
            }
        };

        let has_price = info.as_ref().map_or(false, |i| i.price.is_some());
        if !has_price && self.price_policy == MissingPricePolicy::Drop {
            debug!(tx = ?tx.hash, token = %raw.token, "dropping transfer without USD price");
            return None;
        }

        Some(TokenTransfer {
            token: info.unwrap_or_else(|| TokenInfo::unknown(raw.token)),
            from_address: raw.from,
            to_address: raw.to,
            amount,
            operation: classify(raw.from, tx.from),
        })
    }
}
