//! On-chain metadata resolution backed by the JSON cache.
//!
//! Token identities come from ERC-20 calls with a bytes32 fallback for
//! pre-standard tokens (MKR and friends). V4 pool ids are opaque hashes, so
//! the resolver recovers their currencies by scanning the PoolManager's
//! Initialize logs in chunks from its deployment block.

use std::{sync::Arc, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    network::TransactionBuilder,
    primitives::{Address, Bytes, B256},
    providers::Provider,
    rpc::types::{Filter, TransactionRequest},
    sol_types::SolEvent,
};

use crate::{
    cache::{
        v3_key, MetadataCache, PairDescriptor, PoolDescriptor, PoolV3Descriptor, PoolV4Descriptor,
        TokenDescriptor,
    },
    chain::{self, block_chunks},
    config::ChainSettings,
    contracts::{IPoolManager, IUniswapV2Pair, IUniswapV3Pool, IERC20},
    error::AppError,
    retry::RetryPolicy,
};

// symbol() / name() selectors, for the raw bytes32 fallback calls
const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
const NAME_SELECTOR: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];

/// Decode a `bytes32`-style string return: fixed 32 bytes, right-padded
/// with zeros
fn decode_bytes32_string(raw: &[u8]) -> Option<String> {
    if raw.len() < 32 {
        return None;
    }
    let trimmed: Vec<u8> = raw[..32].iter().copied().take_while(|&b| b != 0).collect();
    let text = String::from_utf8(trimmed).ok()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub struct MetadataResolver<P> {
    provider: P,
    cache: Arc<MetadataCache>,
    native_token: TokenDescriptor,
    v4_pool_manager: Address,
    v4_deployment_block: u64,
    init_scan_chunk: u64,
    log_policy: RetryPolicy,
}

impl<P: Provider + Clone> MetadataResolver<P> {
    pub fn new(provider: P, cache: Arc<MetadataCache>, settings: &ChainSettings) -> Self {
        Self {
            provider,
            cache,
            native_token: settings.native_token.clone(),
            v4_pool_manager: settings.v4_pool_manager,
            v4_deployment_block: settings.v4_deployment_block,
            init_scan_chunk: settings.init_scan_chunk,
            log_policy: RetryPolicy::exponential(
                settings.log_fetch_retries,
                Duration::from_secs(1),
                settings.max_backoff,
            ),
        }
    }

    /// Resolve a token. The zero address is the chain's native currency
    /// (V4 pools hold it directly). Failed metadata calls degrade to an
    /// in-memory UNKNOWN placeholder instead of aborting the swap.
    pub async fn token(&self, address: Address) -> Result<TokenDescriptor, AppError> {
        if address == Address::ZERO {
            return Ok(self.native_token.clone());
        }

        let key = address.to_string().to_lowercase();
        if let Some(token) = self.cache.get_token(&key) {
            return Ok(token);
        }

        let erc20 = IERC20::new(address, self.provider.clone());
        let symbol = self.string_call(address, erc20.symbol().call().await.map(|ret| ret._0), SYMBOL_SELECTOR).await;

        let token = match symbol {
            Some(symbol) => {
                // decimals reverting alone is survivable; 18 is the common case
                let decimals = erc20
                    .decimals()
                    .call()
                    .await
                    .map(|ret| ret._0)
                    .unwrap_or(18);
                let name = self
                    .string_call(address, erc20.name().call().await.map(|ret| ret._0), NAME_SELECTOR)
                    .await
                    .unwrap_or_else(|| symbol.clone());
                let token = TokenDescriptor {
                    address: key,
                    symbol,
                    name,
                    decimals,
                };
                println!("Resolved token {} ({})", token.symbol, token.address);
                self.cache.put_token(token.clone());
                token
            }
            None => {
                eprintln!("Token metadata unavailable for {key}, using placeholder");
                let token = TokenDescriptor::unknown(&key);
                self.cache.put_token_transient(token.clone());
                token
            }
        };

        Ok(token)
    }

    /// Take the typed string result if it decoded, otherwise retry the call
    /// raw and interpret the return as a bytes32 string
    async fn string_call(
        &self,
        address: Address,
        typed: Result<String, alloy::contract::Error>,
        selector: [u8; 4],
    ) -> Option<String> {
        if let Ok(value) = typed {
            return Some(value);
        }

        let request = TransactionRequest::default()
            .with_to(address)
            .with_input(Bytes::copy_from_slice(&selector));
        let raw = self.provider.call(&request).await.ok()?;
        decode_bytes32_string(&raw)
    }

    pub async fn pair(&self, address: Address) -> Result<PairDescriptor, AppError> {
        let key = address.to_string().to_lowercase();
        if let Some(PoolDescriptor::V2(pair)) = self.cache.get_pool(&key) {
            return Ok(pair);
        }

        let contract = IUniswapV2Pair::new(address, self.provider.clone());
        let token0 = contract.token0().call().await?._0;
        let token1 = contract.token1().call().await?._0;

        let pair = PairDescriptor {
            address: key.clone(),
            token0: self.token(token0).await?,
            token1: self.token(token1).await?,
        };
        println!(
            "Resolved pair {} ({}/{})",
            pair.address, pair.token0.symbol, pair.token1.symbol
        );
        self.cache.put_pool(&key, PoolDescriptor::V2(pair.clone()));
        Ok(pair)
    }

    pub async fn pool_v3(&self, address: Address) -> Result<PoolV3Descriptor, AppError> {
        let key = v3_key(&address.to_string());
        if let Some(PoolDescriptor::V3(pool)) = self.cache.get_pool(&key) {
            return Ok(pool);
        }

        let contract = IUniswapV3Pool::new(address, self.provider.clone());
        let token0 = contract.token0().call().await?._0;
        let token1 = contract.token1().call().await?._0;
        let fee = contract.fee().call().await?._0;

        let pool = PoolV3Descriptor {
            address: address.to_string().to_lowercase(),
            token0: self.token(token0).await?,
            token1: self.token(token1).await?,
            fee: fee.to::<u32>(),
        };
        println!(
            "Resolved V3 pool {} ({}/{} fee {})",
            pool.address, pool.token0.symbol, pool.token1.symbol, pool.fee
        );
        self.cache.put_pool(&key, PoolDescriptor::V3(pool.clone()));
        Ok(pool)
    }

    /// Resolve a V4 pool id by scanning the PoolManager's Initialize logs.
    /// The id is an indexed topic, so each chunk query stays cheap even over
    /// the full history since deployment.
    pub async fn pool_v4(&self, pool_id: B256) -> Result<PoolV4Descriptor, AppError> {
        let key = pool_id.to_string().to_lowercase();
        if let Some(PoolDescriptor::V4(pool)) = self.cache.get_pool(&key) {
            return Ok(pool);
        }

        println!("Resolving V4 pool {key} from Initialize history...");
        let latest = chain::latest_block(&self.provider).await?;

        for (from, to) in block_chunks(self.v4_deployment_block, latest, self.init_scan_chunk) {
            let filter = Filter::new()
                .address(self.v4_pool_manager)
                .event_signature(IPoolManager::Initialize::SIGNATURE_HASH)
                .topic1(pool_id)
                .from_block(BlockNumberOrTag::Number(from))
                .to_block(BlockNumberOrTag::Number(to));

            let logs = chain::fetch_logs(&self.provider, &filter, &self.log_policy).await?;
            if let Some(log) = logs.first() {
                let decoded = log
                    .log_decode::<IPoolManager::Initialize>()
                    .map_err(|err| AppError::EventDecode(err.to_string()))?;
                let init = decoded.inner.data;

                let pool = PoolV4Descriptor {
                    pool_id: key.clone(),
                    currency0: self.token(init.currency0).await?,
                    currency1: self.token(init.currency1).await?,
                    fee: init.fee.to::<u32>(),
                    tick_spacing: init.tickSpacing.as_i32(),
                    hooks: init.hooks.to_string().to_lowercase(),
                };
                println!(
                    "Resolved V4 pool {} ({}/{} fee {})",
                    pool.pool_id, pool.currency0.symbol, pool.currency1.symbol, pool.fee
                );
                self.cache.put_pool(&key, PoolDescriptor::V4(pool.clone()));
                return Ok(pool);
            }
        }

        Err(AppError::PoolNotFound(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes32_string_trims_padding() {
        let mut raw = [0u8; 32];
        raw[..3].copy_from_slice(b"MKR");
        assert_eq!(decode_bytes32_string(&raw), Some("MKR".to_string()));
    }

    #[test]
    fn bytes32_string_rejects_short_or_empty_returns() {
        assert_eq!(decode_bytes32_string(&[]), None);
        assert_eq!(decode_bytes32_string(&[0u8; 32]), None);
        assert_eq!(decode_bytes32_string(b"short"), None);
    }
}
