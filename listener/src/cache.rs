//! Metadata cache: address/pool-id → descriptor maps persisted as JSON files
//! per chain, so restarts do not re-query the chain for known identities.
//! The files are pretty-printed and keyed by lowercase hex so operators can
//! inspect and edit them.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

/// Token metadata, immutable once resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl TokenDescriptor {
    /// Degraded placeholder for tokens whose metadata calls revert
    pub fn unknown(address: &str) -> Self {
        Self {
            address: address.to_lowercase(),
            symbol: "UNKNOWN".to_string(),
            name: "Unknown Token".to_string(),
            decimals: 18,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == "UNKNOWN"
    }
}

/// Constant-product pair (V2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairDescriptor {
    pub address: String,
    pub token0: TokenDescriptor,
    pub token1: TokenDescriptor,
}

/// Concentrated-liquidity pool (V3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolV3Descriptor {
    pub address: String,
    pub token0: TokenDescriptor,
    pub token1: TokenDescriptor,
    /// Fee in hundredths of a bip (e.g. 3000 = 0.30%)
    pub fee: u32,
}

/// Singleton-manager pool (V4), identified by pool id rather than address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolV4Descriptor {
    pub pool_id: String,
    pub currency0: TokenDescriptor,
    pub currency1: TokenDescriptor,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum PoolDescriptor {
    V2(PairDescriptor),
    V3(PoolV3Descriptor),
    V4(PoolV4Descriptor),
}

/// Cache key for V3 pools, namespaced so a V2 pair and a V3 pool at
/// different addresses never collide in the same map
pub fn v3_key(address: &str) -> String {
    format!("v3_{}", address.to_lowercase())
}

pub struct MetadataCache {
    chain_id: u64,
    cache_dir: PathBuf,
    tokens: RwLock<HashMap<String, TokenDescriptor>>,
    pools: RwLock<HashMap<String, PoolDescriptor>>,
}

impl MetadataCache {
    pub fn new(cache_dir: &Path, chain_id: u64) -> Self {
        let cache = Self {
            chain_id,
            cache_dir: cache_dir.to_path_buf(),
            tokens: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
        };

        if let Err(err) = fs::create_dir_all(cache_dir) {
            eprintln!("Failed to create cache directory {cache_dir:?}: {err}");
        }

        cache.load();
        cache
    }

    fn token_cache_file(&self) -> PathBuf {
        self.cache_dir
            .join(format!("token_cache_{}.json", self.chain_id))
    }

    fn pool_cache_file(&self) -> PathBuf {
        self.cache_dir
            .join(format!("pool_cache_{}.json", self.chain_id))
    }

    fn load(&self) {
        if let Ok(data) = fs::read_to_string(self.token_cache_file()) {
            match serde_json::from_str::<HashMap<String, TokenDescriptor>>(&data) {
                Ok(map) => *self.write_tokens() = map,
                Err(err) => eprintln!("Failed to parse token cache: {err}"),
            }
        }

        if let Ok(data) = fs::read_to_string(self.pool_cache_file()) {
            match serde_json::from_str::<HashMap<String, PoolDescriptor>>(&data) {
                Ok(map) => *self.write_pools() = map,
                Err(err) => eprintln!("Failed to parse pool cache: {err}"),
            }
        }

        println!(
            "Loaded {} tokens and {} pools from cache",
            self.read_tokens().len(),
            self.read_pools().len()
        );
    }

    fn write_tokens(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, TokenDescriptor>> {
        self.tokens.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_tokens(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, TokenDescriptor>> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_pools(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PoolDescriptor>> {
        self.pools.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_pools(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PoolDescriptor>> {
        self.pools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn save_tokens(&self) {
        let data = match serde_json::to_string_pretty(&*self.read_tokens()) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("Failed to serialize token cache: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(self.token_cache_file(), data) {
            eprintln!("Failed to write token cache file: {err}");
        }
    }

    fn save_pools(&self) {
        let data = match serde_json::to_string_pretty(&*self.read_pools()) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("Failed to serialize pool cache: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(self.pool_cache_file(), data) {
            eprintln!("Failed to write pool cache file: {err}");
        }
    }

    pub fn get_token(&self, address: &str) -> Option<TokenDescriptor> {
        self.read_tokens().get(&address.to_lowercase()).cloned()
    }

    /// Write-through: updates the in-memory map and rewrites the cache file
    pub fn put_token(&self, token: TokenDescriptor) {
        self.write_tokens()
            .insert(token.address.to_lowercase(), token);
        self.save_tokens();
    }

    /// In-memory only. Used for degraded placeholders so a transient RPC
    /// failure is not pinned across restarts.
    pub fn put_token_transient(&self, token: TokenDescriptor) {
        self.write_tokens()
            .insert(token.address.to_lowercase(), token);
    }

    pub fn get_pool(&self, key: &str) -> Option<PoolDescriptor> {
        self.read_pools().get(&key.to_lowercase()).cloned()
    }

    pub fn put_pool(&self, key: &str, pool: PoolDescriptor) {
        self.write_pools().insert(key.to_lowercase(), pool);
        self.save_pools();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("swapcache_{}_{tag}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn usdc() -> TokenDescriptor {
        TokenDescriptor {
            address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
            symbol: "USDC".to_string(),
            name: "USD Coin".to_string(),
            decimals: 6,
        }
    }

    #[test]
    fn token_roundtrip_survives_reload() {
        let dir = temp_cache_dir("roundtrip");

        let cache = MetadataCache::new(&dir, 1);
        cache.put_token(usdc());

        let reloaded = MetadataCache::new(&dir, 1);
        assert_eq!(reloaded.get_token(&usdc().address), Some(usdc()));
    }

    #[test]
    fn keys_are_case_insensitive() {
        let dir = temp_cache_dir("case");

        let cache = MetadataCache::new(&dir, 1);
        cache.put_token(usdc());

        assert!(cache
            .get_token("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
            .is_some());
    }

    #[test]
    fn transient_entries_are_not_persisted() {
        let dir = temp_cache_dir("transient");

        let cache = MetadataCache::new(&dir, 1);
        let placeholder = TokenDescriptor::unknown("0x00000000000000000000000000000000000000aa");
        assert!(placeholder.is_unknown());
        cache.put_token_transient(placeholder.clone());

        // visible within the process
        assert_eq!(cache.get_token(&placeholder.address), Some(placeholder));

        // gone after reload
        let reloaded = MetadataCache::new(&dir, 1);
        assert!(reloaded
            .get_token("0x00000000000000000000000000000000000000aa")
            .is_none());
    }

    #[test]
    fn pools_are_keyed_per_chain() {
        let dir = temp_cache_dir("chains");

        let cache = MetadataCache::new(&dir, 1);
        cache.put_pool(
            "0xpair",
            PoolDescriptor::V2(PairDescriptor {
                address: "0xpair".to_string(),
                token0: usdc(),
                token1: TokenDescriptor::unknown("0xbb"),
            }),
        );

        // a different chain id reads a different file
        let other_chain = MetadataCache::new(&dir, 56);
        assert!(other_chain.get_pool("0xpair").is_none());
        assert!(MetadataCache::new(&dir, 1).get_pool("0xpair").is_some());
    }
}
