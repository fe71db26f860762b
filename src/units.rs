//! Base-unit to display-unit conversion
//!
//! Raw on-chain integers (wei, token base units) are turned into
//! `rust_decimal::Decimal` by exact scaling. Decimal has a 96-bit mantissa
//! and at most 28 fractional digits, so wider values lose their lowest
//! digits instead of failing.

use alloy_primitives::U256;
use anyhow::Result;
use rust_decimal::Decimal;

/// Decimals of the native currency (wei -> ETH).
pub const NATIVE_DECIMALS: u8 = 18;

/// Decimals of a gwei quote (wei -> gwei).
pub const GWEI_DECIMALS: u8 = 9;

/// Fallback when a token's `decimals()` lookup fails.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

const MAX_SCALE: u32 = 28;
const MANTISSA_BITS: usize = 96;

/// Convert `raw / 10^decimals` into a Decimal.
pub fn to_decimal(raw: U256, decimals: u8) -> Result<Decimal> {
    let ten = U256::from(10u64);
    let mut value = raw;
    let mut scale = u32::from(decimals);

    while scale > MAX_SCALE || value.bit_len() > MANTISSA_BITS {
        if scale == 0 {
            anyhow::bail!("value {} does not fit a decimal", raw);
        }
        value /= ten;
        scale -= 1;
    }

    let mantissa = i128::try_from(value.to::<u128>())?;
    Ok(Decimal::from_i128_with_scale(mantissa, scale).normalize())
}

/// Wei to ETH.
pub fn wei_to_native(wei: U256) -> Result<Decimal> {
    to_decimal(wei, NATIVE_DECIMALS)
}

/// Wei to gwei.
pub fn wei_to_gwei(wei: U256) -> Result<Decimal> {
    to_decimal(wei, GWEI_DECIMALS)
}
