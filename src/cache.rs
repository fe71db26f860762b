//! Token decimals cache
//!
//! `decimals()` of an ERC20 contract never changes, so a successful lookup
//! is kept for the lifetime of the polling worker. Failed lookups are not
//! cached: the caller falls back to the default for that transfer only and
//! the next transfer of the same token tries again.

use crate::provider::ChainProvider;
use crate::units::DEFAULT_TOKEN_DECIMALS;
use alloy_primitives::Address;
use std::collections::HashMap;
use tracing::warn;

pub struct DecimalsCache {
    cache: HashMap<Address, u8>,
}

impl DecimalsCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    pub fn get(&self, token: Address) -> Option<u8> {
        self.cache.get(&token).copied()
    }

    pub fn insert(&mut self, token: Address, decimals: u8) {
        self.cache.insert(token, decimals);
    }

    /// Cached decimals, else a live lookup, else the default of 18.
    pub async fn resolve(&mut self, provider: &dyn ChainProvider, token: Address) -> u8 {
        if let Some(decimals) = self.get(token) {
            return decimals;
        }

        match provider.get_token_decimals(token).await {
            Ok(decimals) => {
                self.insert(token, decimals);
                decimals
            }
            Err(e) => {
                warn!(
                    token = %token,
                    error = %e,
                    "decimals() lookup failed, assuming {}",
                    DEFAULT_TOKEN_DECIMALS
                );
                DEFAULT_TOKEN_DECIMALS
            }
        }
    }
}

impl Default for DecimalsCache {
    fn default() -> Self {
        Self::new()
    }
}
