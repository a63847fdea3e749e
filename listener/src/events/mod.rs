//! Swap log decoding.
//!
//! One decoder per protocol generation lives in its own submodule; dispatch
//! happens on topic0. All three produce the same [`SwapRecord`] so the sinks
//! never care which generation a swap came from.

pub mod v2;
pub mod v3;
pub mod v4;

use std::sync::Arc;

use alloy::{
    primitives::U256, providers::Provider, rpc::types::Log, sol_types::SolEvent,
};
use serde::Serialize;

use crate::{
    cache::TokenDescriptor,
    config::ChainSettings,
    contracts::{IPoolManager, IUniswapV2Pair, IUniswapV3Pool},
    error::AppError,
    resolve::MetadataResolver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Protocol {
    V2,
    V3,
    V4,
}

impl Protocol {
    pub fn dex_name(&self) -> &'static str {
        match self {
            Protocol::V2 => "uniswap_v2",
            Protocol::V3 => "uniswap_v3",
            Protocol::V4 => "uniswap_v4",
        }
    }

    /// Classify a log by its topic0, if it is a swap we understand
    pub fn from_log(log: &Log) -> Option<Self> {
        let topic0 = log.topic0()?;
        if *topic0 == IUniswapV2Pair::Swap::SIGNATURE_HASH {
            Some(Protocol::V2)
        } else if *topic0 == IUniswapV3Pool::Swap::SIGNATURE_HASH {
            Some(Protocol::V3)
        } else if *topic0 == IPoolManager::Swap::SIGNATURE_HASH {
            Some(Protocol::V4)
        } else {
            None
        }
    }
}

/// Pool state captured alongside the swap, raw integer strings so nothing
/// is lost to float rounding before it reaches a sink
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PoolState {
    Reserves {
        reserve0: String,
        reserve1: String,
    },
    SqrtPrice {
        sqrt_price_x96: String,
        liquidity: String,
        tick: i32,
    },
}

/// One decoded swap, normalized across protocol generations
#[derive(Debug, Clone, Serialize)]
pub struct SwapRecord {
    pub chain: String,
    pub protocol: Protocol,
    /// Pair/pool address for V2/V3, pool id hex for V4
    pub pool_key: String,
    /// Fee in hundredths of a bip; V2 pairs are fixed-fee and carry none
    pub fee: Option<u32>,
    pub token_in: TokenDescriptor,
    pub token_out: TokenDescriptor,
    pub amount_in: f64,
    pub amount_out: f64,
    /// Spot price as token1 per token0, in human units
    pub price: f64,
    pub sender: String,
    pub recipient: Option<String>,
    pub tx_hash: String,
    pub block_number: u64,
    pub state: PoolState,
}

pub struct SwapDecoder<P> {
    provider: P,
    resolver: Arc<MetadataResolver<P>>,
    chain_name: String,
}

impl<P: Provider + Clone> SwapDecoder<P> {
    pub fn new(provider: P, resolver: Arc<MetadataResolver<P>>, settings: &ChainSettings) -> Self {
        Self {
            provider,
            resolver,
            chain_name: settings.name.clone(),
        }
    }

    /// Decode a swap log. Returns `None` for logs that are not swaps, so
    /// callers can feed whole receipts through without pre-filtering.
    pub async fn decode(&self, log: &Log) -> Result<Option<SwapRecord>, AppError> {
        match Protocol::from_log(log) {
            Some(Protocol::V2) => v2::decode(self, log).await.map(Some),
            Some(Protocol::V3) => v3::decode(self, log).await.map(Some),
            Some(Protocol::V4) => v4::decode(self, log).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Lowercase hex of the log's transaction hash and its block number
fn log_position(log: &Log) -> Result<(String, u64), AppError> {
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| AppError::EventDecode("log missing transaction hash".into()))?;
    let block_number = log
        .block_number
        .ok_or_else(|| AppError::EventDecode("log missing block number".into()))?;
    Ok((tx_hash.to_string().to_lowercase(), block_number))
}

/// Scale a raw integer amount down by the token's decimals. Lossy by
/// construction, only used for display and float columns.
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let raw = value.to_string().parse::<f64>().unwrap_or(f64::MAX);
    raw / 10f64.powi(i32::from(decimals))
}

pub fn u128_to_f64(value: u128, decimals: u8) -> f64 {
    value as f64 / 10f64.powi(i32::from(decimals))
}

/// token1-per-token0 price from constant-product reserves. Zero reserves
/// (drained pool, or archive data unavailable) give 0.0 rather than inf.
pub fn price_from_reserves(
    reserve0: U256,
    reserve1: U256,
    decimals0: u8,
    decimals1: u8,
) -> f64 {
    if reserve0.is_zero() || reserve1.is_zero() {
        return 0.0;
    }
    u256_to_f64(reserve1, decimals1) / u256_to_f64(reserve0, decimals0)
}

/// token1-per-token0 price from a Q64.96 sqrt price:
/// (sqrtPriceX96 / 2^96)^2 adjusted for the decimal gap
pub fn price_from_sqrt_x96(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    let sqrt = sqrt_price_x96.to_string().parse::<f64>().unwrap_or(0.0);
    let ratio = (sqrt / 2f64.powi(96)).powi(2);
    ratio * 10f64.powi(i32::from(decimals0) - i32::from(decimals1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_amounts_scale_by_decimals() {
        assert_eq!(u256_to_f64(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(u128_to_f64(2_000_000_000_000_000_000u128, 18), 2.0);
        assert_eq!(u256_to_f64(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn reserve_price_is_token1_per_token0() {
        // 1,000 of token0 (6 decimals) against 2,000,000 of token1 (18)
        let price = price_from_reserves(
            U256::from(1_000_000_000u64),
            U256::from(2_000_000u64) * U256::from(10u64).pow(U256::from(18u64)),
            6,
            18,
        );
        assert!((price - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn drained_pool_prices_at_zero() {
        assert_eq!(price_from_reserves(U256::ZERO, U256::from(5u64), 18, 18), 0.0);
        assert_eq!(price_from_reserves(U256::from(5u64), U256::ZERO, 18, 18), 0.0);
    }

    #[test]
    fn sqrt_price_identity_at_x96() {
        // sqrtPriceX96 == 2^96 means a 1:1 pool when decimals match
        let one_x96 = U256::from(1u64) << 96;
        assert!((price_from_sqrt_x96(one_x96, 18, 18) - 1.0).abs() < 1e-9);
        // doubling the sqrt price quadruples the price
        assert!((price_from_sqrt_x96(one_x96 * U256::from(2u64), 18, 18) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn sqrt_price_applies_decimal_gap() {
        let one_x96 = U256::from(1u64) << 96;
        // token0 has 6 decimals, token1 has 18: raw 1:1 is 10^-12 in human units
        let price = price_from_sqrt_x96(one_x96, 6, 18);
        assert!((price - 1e-12).abs() < 1e-21);
    }

    #[test]
    fn sqrt_price_is_monotonic() {
        let low = price_from_sqrt_x96(U256::from(3u64) << 96, 18, 18);
        let high = price_from_sqrt_x96(U256::from(4u64) << 96, 18, 18);
        assert!(high > low);
    }

    #[test]
    fn unknown_topics_are_not_swaps() {
        let log = Log::default();
        assert_eq!(Protocol::from_log(&log), None);
    }
}
