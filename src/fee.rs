//! Gas fee accounting for transaction events
//!
//! Resolves the price actually paid per gas for legacy and EIP-1559
//! transactions and converts gas usage into display units.

use crate::types::{Block, Receipt, Transaction};
use crate::units::{wei_to_gwei, wei_to_native};
use alloy_primitives::U256;
use anyhow::{Context, Result};
use rust_decimal::Decimal;

/// Gas figures attached to a transaction event.
#[derive(Debug, Clone, PartialEq)]
pub struct GasSummary {
    pub gas_used: u64,
    /// Effective price per gas, in gwei
    pub gas_price: Decimal,
    /// gas_used * price, in native display units
    pub gas_cost: Decimal,
}

/// Effective price per gas in wei.
///
/// Priority order:
/// 1. `effectiveGasPrice` from the receipt (post-London)
/// 2. `gasPrice` for legacy transactions
/// 3. `min(max_fee, base_fee + max_priority_fee)` for EIP-1559
pub fn effective_gas_price(tx: &Transaction, receipt: &Receipt, block: &Block) -> Result<U256> {
    if let Some(egp) = receipt.effective_gas_price {
        return Ok(egp);
    }

    if tx.is_legacy() {
        return tx.gas_price.context("Legacy transaction missing gas_price");
    }

    if tx.is_eip1559() {
        let base_fee = block
            .base_fee_per_gas
            .context("EIP-1559 transaction but block missing base_fee_per_gas")?;
        let max_fee = tx
            .max_fee_per_gas
            .context("EIP-1559 transaction missing max_fee_per_gas")?;
        let max_priority_fee = tx.max_priority_fee_per_gas.unwrap_or(U256::ZERO);

        return Ok(base_fee.saturating_add(max_priority_fee).min(max_fee));
    }

    anyhow::bail!("Transaction type not recognized (neither legacy nor EIP-1559)");
}

/// Summarize gas usage and cost for a mined transaction.
pub fn gas_summary(tx: &Transaction, receipt: &Receipt, block: &Block) -> Result<GasSummary> {
    let price = effective_gas_price(tx, receipt, block)?;
    if receipt.gas_used.bit_len() > 64 {
        anyhow::bail!("gas_used {} does not fit in u64", receipt.gas_used);
    }
    let gas_used = receipt.gas_used.to::<u64>();
    let cost = receipt.gas_used.saturating_mul(price);

    Ok(GasSummary {
        gas_used,
        gas_price: wei_to_gwei(price)?,
        gas_cost: wei_to_native(cost)?,
    })
}
