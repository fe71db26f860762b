//! Token market-data lookup
//!
//! `TokenInfoResolver` is the seam the analyzer uses to enrich a token
//! address with symbol, USD price, 24h volume, liquidity and price change.
//! `DexScreenerResolver` implements it against the DexScreener public API.

use crate::config::{parse_address, DexScreenerConfig};
use crate::events::TokenInfo;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait TokenInfoResolver: Send + Sync {
    /// Market data for `token`; `Ok(None)` when no market lists it.
    async fn get_token_info(&self, token: Address) -> Result<Option<TokenInfo>>;
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
struct DexPair {
    #[serde(rename = "chainId")]
    chain_id: Option<String>,
    #[serde(rename = "baseToken")]
    base_token: PairToken,
    #[serde(rename = "quoteToken")]
    quote_token: PairToken,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    #[serde(rename = "priceNative")]
    price_native: Option<String>,
    volume: Option<Window>,
    liquidity: Option<Liquidity>,
    #[serde(rename = "priceChange")]
    price_change: Option<Window>,
}

#[derive(Debug, Deserialize)]
struct PairToken {
    address: String,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Window {
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

impl DexPair {
    fn volume_24h(&self) -> f64 {
        self.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0)
    }

    /// Build a `TokenInfo` for whichever side of the pair `token` is on.
    fn token_info(&self, token: Address) -> TokenInfo {
        let is_base = parse_address(&self.base_token.address).ok() == Some(token);
        let side = if is_base {
            &self.base_token
        } else {
            &self.quote_token
        };

        let price_usd = self.price_usd.as_deref().and_then(|p| Decimal::from_str(p).ok());
        let price = if is_base {
            price_usd
        } else {
            // priceNative is the base token quoted in the quote token
            let native = self
                .price_native
                .as_deref()
                .and_then(|p| Decimal::from_str(p).ok())
                .filter(|n| !n.is_zero());
            match (price_usd, native) {
                (Some(usd), Some(native)) => usd.checked_div(native),
                _ => None,
            }
        };

        TokenInfo {
            address: token,
            symbol: side
                .symbol
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            price,
            volume24h: decimal_or_zero(Some(self.volume_24h())),
            liquidity: decimal_or_zero(self.liquidity.as_ref().and_then(|l| l.usd)),
            price_change_24h: decimal_or_zero(self.price_change.as_ref().and_then(|p| p.h24)),
        }
    }
}

fn decimal_or_zero(value: Option<f64>) -> Decimal {
    value.and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO)
}

/// Pick the highest-volume pair on `chain_id` and turn it into a `TokenInfo`.
fn select_token_info(pairs: Vec<DexPair>, chain_id: &str, token: Address) -> Option<TokenInfo> {
    pairs
        .into_iter()
        .filter(|p| p.chain_id.as_deref() == Some(chain_id))
        .max_by(|a, b| a.volume_24h().total_cmp(&b.volume_24h()))
        .map(|pair| pair.token_info(token))
}

/// Market data from `GET {base_url}/dex/tokens/{address}`.
pub struct DexScreenerResolver {
    client: reqwest::Client,
    base_url: String,
    chain_id: String,
    fixed_prices: HashMap<Address, Decimal>,
}

impl DexScreenerResolver {
    pub fn new(config: &DexScreenerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let mut fixed_prices = HashMap::new();
        for (token, price) in &config.fixed_prices {
            let address = parse_address(token)
                .with_context(|| format!("Invalid address in fixed_prices: {}", token))?;
            let price = Decimal::from_f64(*price)
                .with_context(|| format!("Invalid fixed price for {}: {}", token, price))?;
            fixed_prices.insert(address, price);
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            fixed_prices,
        })
    }

    async fn fetch_pairs(&self, token: Address) -> Result<Vec<DexPair>> {
        let url = format!("{}/dex/tokens/0x{:x}", self.base_url, token);
        let response: TokensResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send market data request")?
            .error_for_status()
            .context("Market data request rejected")?
            .json()
            .await
            .context("Failed to parse market data response")?;
        Ok(response.pairs.unwrap_or_default())
    }
}

#[async_trait]
impl TokenInfoResolver for DexScreenerResolver {
    async fn get_token_info(&self, token: Address) -> Result<Option<TokenInfo>> {
        let pinned = self.fixed_prices.get(&token).copied();

        let pairs = match self.fetch_pairs(token).await {
            Ok(pairs) => pairs,
            // Pinned tokens still resolve without market data
            Err(e) if pinned.is_some() => {
                debug!(token = %token, error = %e, "market data unavailable for pinned token");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let info = select_token_info(pairs, &self.chain_id, token);
        Ok(match (info, pinned) {
            (Some(mut info), Some(price)) => {
                info.price = Some(price);
                Some(info)
            }
            (None, Some(price)) => Some(TokenInfo {
                price: Some(price),
                ..TokenInfo::unknown(token)
            }),
            (info, None) => info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    const WETH: Address = address!("4200000000000000000000000000000000000006");
    const USDC: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");

    fn pairs(value: serde_json::Value) -> Vec<DexPair> {
        serde_json::from_value::<TokensResponse>(value)
            .unwrap()
            .pairs
            .unwrap_or_default()
    }

    fn sample() -> serde_json::Value {
        json!({
            "pairs": [
                {
                    "chainId": "base",
                    "baseToken": { "address": "0x4200000000000000000000000000000000000006", "symbol": "WETH" },
                    "quoteToken": { "address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "symbol": "USDC" },
                    "priceUsd": "3000.50",
                    "priceNative": "3000.50",
                    "volume": { "h24": 1500000.0 },
                    "liquidity": { "usd": 8000000.0 },
                    "priceChange": { "h24": -2.5 }
                },
                {
                    "chainId": "base",
                    "baseToken": { "address": "0x4200000000000000000000000000000000000006", "symbol": "WETH" },
                    "quoteToken": { "address": "0x0000000000000000000000000000000000000bad", "symbol": "BAD" },
                    "priceUsd": "1.00",
                    "volume": { "h24": 10.0 }
                },
                {
                    "chainId": "ethereum",
                    "baseToken": { "address": "0x4200000000000000000000000000000000000006", "symbol": "WETH" },
                    "quoteToken": { "address": "0x0000000000000000000000000000000000000001", "symbol": "X" },
                    "priceUsd": "2.00",
                    "volume": { "h24": 99999999.0 }
                }
            ]
        })
    }

    #[test]
    fn test_selects_highest_volume_pair_on_chain() {
        let info = select_token_info(pairs(sample()), "base", WETH).unwrap();
        assert_eq!(info.symbol, "WETH");
        assert_eq!(info.price, Some(Decimal::from_str("3000.50").unwrap()));
        assert_eq!(info.volume24h, Decimal::from(1_500_000));
        assert_eq!(info.liquidity, Decimal::from(8_000_000));
        assert_eq!(info.price_change_24h, Decimal::from_str("-2.5").unwrap());
    }

    #[test]
    fn test_quote_side_price_is_derived() {
        let info = select_token_info(pairs(sample()), "base", USDC).unwrap();
        assert_eq!(info.symbol, "USDC");
        assert_eq!(info.price, Some(Decimal::ONE));
    }

    #[test]
    fn test_no_pairs_on_chain() {
        assert!(select_token_info(pairs(sample()), "arbitrum", WETH).is_none());
        assert!(select_token_info(pairs(json!({ "pairs": null })), "base", WETH).is_none());
    }

    #[test]
    fn test_missing_market_fields_default_to_zero() {
        let raw = json!({
            "pairs": [{
                "chainId": "base",
                "baseToken": { "address": "0x4200000000000000000000000000000000000006" },
                "quoteToken": { "address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913" }
            }]
        });
        let info = select_token_info(pairs(raw), "base", WETH).unwrap();
        assert_eq!(info.symbol, "UNKNOWN");
        assert_eq!(info.price, None);
        assert_eq!(info.liquidity, Decimal::ZERO);
    }
}
