use std::{env, path::PathBuf, str::FromStr, time::Duration};

use alloy::primitives::Address;

use crate::{cache::TokenDescriptor, error::AppError};

mod defaults {
    pub const CHAIN_ID: &str = "1";
    pub const CHAIN_NAME: &str = "Ethereum";
    pub const NATIVE_SYMBOL: &str = "ETH";
    pub const NATIVE_NAME: &str = "Ethereum";
    pub const NATIVE_DECIMALS: &str = "18";
    pub const POLL_INTERVAL_SECS: &str = "3";
    pub const MAX_BACKOFF_SECS: &str = "30";
    pub const BACKFILL_CHUNK: &str = "2000";
    pub const INIT_SCAN_CHUNK: &str = "50000";
    pub const CACHE_DIR: &str = "cache";
    pub const RECEIPT_RETRIES: &str = "3";
    pub const RECEIPT_RETRY_DELAY_MS: &str = "500";
    pub const LOG_FETCH_RETRIES: &str = "5";
    pub const MAX_CONSECUTIVE_ERRORS: &str = "3";
    /// Uniswap V4 PoolManager on Ethereum mainnet
    pub const V4_POOL_MANAGER: &str = "0x000000000004444c5dc75cb358380d2e3de08a90";
    pub const V4_DEPLOYMENT_BLOCK: &str = "21688329";
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, AppError> {
    raw.parse::<u64>()
        .map_err(|_| AppError::InvalidBlockNumber(format!("{key}={raw}")))
}

/// Per-chain settings, read from the environment once at startup
#[derive(Clone, Debug)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub native_token: TokenDescriptor,
    /// Optional pool scope: lowercase pair/pool addresses or V4 pool ids.
    /// Empty means every pool is processed.
    pub pool_filter: Vec<String>,
    pub v4_pool_manager: Address,
    pub v4_deployment_block: u64,
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    pub backfill_chunk: u64,
    pub init_scan_chunk: u64,
    pub cache_dir: PathBuf,
    pub receipt_retries: u32,
    pub receipt_retry_delay: Duration,
    pub log_fetch_retries: u32,
    pub max_consecutive_errors: u32,
}

impl ChainSettings {
    pub fn from_env() -> Result<Self, AppError> {
        let rpc_url = env::var("RPC_URL").map_err(|_| AppError::MissingEnvVar("RPC_URL".into()))?;

        let chain_id = parse_u64("CHAIN_ID", &env_or("CHAIN_ID", defaults::CHAIN_ID))?;

        let native_token = TokenDescriptor {
            address: Address::ZERO.to_string().to_lowercase(),
            symbol: env_or("NATIVE_SYMBOL", defaults::NATIVE_SYMBOL),
            name: env_or("NATIVE_NAME", defaults::NATIVE_NAME),
            decimals: env_or("NATIVE_DECIMALS", defaults::NATIVE_DECIMALS)
                .parse::<u8>()
                .unwrap_or(18),
        };

        let pool_filter = env::var("POOL_FILTER")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let v4_pool_manager_raw = env_or("V4_POOL_MANAGER", defaults::V4_POOL_MANAGER);
        let v4_pool_manager = Address::from_str(&v4_pool_manager_raw)
            .map_err(|_| AppError::InvalidAddress(v4_pool_manager_raw))?;

        Ok(Self {
            chain_id,
            name: env_or("CHAIN_NAME", defaults::CHAIN_NAME),
            rpc_url,
            native_token,
            pool_filter,
            v4_pool_manager,
            v4_deployment_block: parse_u64(
                "V4_DEPLOYMENT_BLOCK",
                &env_or("V4_DEPLOYMENT_BLOCK", defaults::V4_DEPLOYMENT_BLOCK),
            )?,
            poll_interval: Duration::from_secs(parse_u64(
                "POLL_INTERVAL",
                &env_or("POLL_INTERVAL", defaults::POLL_INTERVAL_SECS),
            )?),
            max_backoff: Duration::from_secs(parse_u64(
                "MAX_BACKOFF_SECS",
                &env_or("MAX_BACKOFF_SECS", defaults::MAX_BACKOFF_SECS),
            )?),
            backfill_chunk: parse_u64(
                "BACKFILL_CHUNK",
                &env_or("BACKFILL_CHUNK", defaults::BACKFILL_CHUNK),
            )?
            .max(1),
            init_scan_chunk: parse_u64(
                "INIT_SCAN_CHUNK",
                &env_or("INIT_SCAN_CHUNK", defaults::INIT_SCAN_CHUNK),
            )?
            .max(1),
            cache_dir: PathBuf::from(env_or("CACHE_DIR", defaults::CACHE_DIR)),
            receipt_retries: env_or("RECEIPT_RETRIES", defaults::RECEIPT_RETRIES)
                .parse::<u32>()
                .unwrap_or(3),
            receipt_retry_delay: Duration::from_millis(
                env_or("RECEIPT_RETRY_DELAY_MS", defaults::RECEIPT_RETRY_DELAY_MS)
                    .parse::<u64>()
                    .unwrap_or(500),
            ),
            log_fetch_retries: env_or("LOG_FETCH_RETRIES", defaults::LOG_FETCH_RETRIES)
                .parse::<u32>()
                .unwrap_or(5),
            max_consecutive_errors: env_or(
                "MAX_CONSECUTIVE_ERRORS",
                defaults::MAX_CONSECUTIVE_ERRORS,
            )
            .parse::<u32>()
            .unwrap_or(3),
        })
    }

    /// Check a pool against the optional scope filter. `key` is a pair/pool
    /// address or a V4 pool id in hex.
    pub fn should_process_pool(&self, key: &str) -> bool {
        self.pool_filter.is_empty() || self.pool_filter.contains(&key.to_lowercase())
    }

    /// Narrow the scope to a single pool (CLI `pool` command)
    pub fn scope_to_pool(&mut self, key: &str) {
        self.pool_filter = vec![key.to_lowercase()];
    }
}
