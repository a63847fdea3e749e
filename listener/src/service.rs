//! Ingestion controller: backfill over block ranges, tail the chain head
//! with a watermark, or decode a single transaction's receipt.

use std::str::FromStr;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256},
    providers::Provider,
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use tokio::time::sleep;

use crate::{
    chain::{self, block_chunks},
    config::ChainSettings,
    contracts::{IPoolManager, IUniswapV2Pair, IUniswapV3Pool},
    error::AppError,
    events::{Protocol, SwapDecoder},
    retry::{is_rate_limited, RetryPolicy},
    sink::Sink,
};

/// The key a log will resolve to, extracted without decoding: V4 swaps are
/// keyed by the pool id in topic1, V2/V3 by the emitting contract
fn pool_key_of(log: &Log) -> Option<String> {
    match Protocol::from_log(log)? {
        Protocol::V4 => log
            .inner
            .data
            .topics()
            .get(1)
            .map(|id| id.to_string().to_lowercase()),
        Protocol::V2 | Protocol::V3 => Some(log.inner.address.to_string().to_lowercase()),
    }
}

/// Where the tail loop resumes after one poll: a successful poll through
/// `head` moves past it, a failed poll leaves the watermark untouched so
/// the same range is retried. Never moves backwards.
fn next_watermark(current: u64, outcome: &Result<u64, AppError>) -> u64 {
    match outcome {
        Ok(head) => (head + 1).max(current),
        Err(_) => current,
    }
}

/// Narrow a query server-side when the scope allows it: a scope of only
/// pair/pool addresses becomes an address filter, a scope of only V4 pool
/// ids becomes a topic1 filter on the PoolManager. Mixed scopes cannot be
/// expressed in one getLogs query and stay client-side.
fn scoped_filter(settings: &ChainSettings, filter: Filter) -> Filter {
    if settings.pool_filter.is_empty() {
        return filter;
    }

    let addresses: Vec<Address> = settings
        .pool_filter
        .iter()
        .filter_map(|key| Address::from_str(key).ok())
        .collect();
    let pool_ids: Vec<B256> = settings
        .pool_filter
        .iter()
        .filter_map(|key| B256::from_str(key).ok())
        .collect();

    if addresses.len() == settings.pool_filter.len() {
        filter.address(addresses)
    } else if pool_ids.len() == settings.pool_filter.len() {
        filter.address(settings.v4_pool_manager).topic1(pool_ids)
    } else {
        filter
    }
}

pub struct IngestionService<P> {
    provider: P,
    settings: ChainSettings,
    decoder: SwapDecoder<P>,
    sink: Sink,
    log_policy: RetryPolicy,
    receipt_policy: RetryPolicy,
}

impl<P: Provider + Clone> IngestionService<P> {
    pub fn new(provider: P, settings: ChainSettings, decoder: SwapDecoder<P>, sink: Sink) -> Self {
        let log_policy = RetryPolicy::exponential(
            settings.log_fetch_retries,
            settings.poll_interval,
            settings.max_backoff,
        );
        let receipt_policy =
            RetryPolicy::fixed(settings.receipt_retries, settings.receipt_retry_delay);

        Self {
            provider,
            settings,
            decoder,
            sink,
            log_policy,
            receipt_policy,
        }
    }

    /// Filter matching all three swap generations in one getLogs call,
    /// narrowed to the configured pool scope where possible
    fn swap_filter(&self, from: u64, to: u64) -> Filter {
        let filter = Filter::new()
            .event_signature(vec![
                IUniswapV2Pair::Swap::SIGNATURE_HASH,
                IUniswapV3Pool::Swap::SIGNATURE_HASH,
                IPoolManager::Swap::SIGNATURE_HASH,
            ])
            .from_block(BlockNumberOrTag::Number(from))
            .to_block(BlockNumberOrTag::Number(to));
        scoped_filter(&self.settings, filter)
    }

    /// Decode and publish one log. Decode failures are reported and skipped
    /// so a single malformed log cannot stall a backfill; sink failures
    /// propagate because losing output is not recoverable by skipping.
    async fn handle_log(&mut self, log: &Log) -> Result<bool, AppError> {
        match pool_key_of(log) {
            Some(key) if self.settings.should_process_pool(&key) => {}
            _ => return Ok(false),
        }

        let record = match self.decoder.decode(log).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(false),
            Err(err) => {
                eprintln!("Skipping undecodable swap log: {err}");
                return Ok(false);
            }
        };

        self.sink.publish(&record).await?;
        Ok(true)
    }

    /// Process one inclusive block range, returning the number of swaps
    /// published
    pub async fn process_range(&mut self, from: u64, to: u64) -> Result<u64, AppError> {
        let filter = self.swap_filter(from, to);
        let logs = chain::fetch_logs(&self.provider, &filter, &self.log_policy).await?;

        let mut published = 0u64;
        for log in &logs {
            if self.handle_log(log).await? {
                published += 1;
            }
        }
        Ok(published)
    }

    /// Backfill a historical range chunk by chunk, oldest first. With
    /// `realtime` set, hand over to tailing once the range is done.
    pub async fn run_historical(
        &mut self,
        from: u64,
        to: Option<u64>,
        realtime: bool,
    ) -> Result<(), AppError> {
        let latest = chain::latest_block(&self.provider).await?;
        let to = to.unwrap_or(latest).min(latest);
        if from > to {
            return Err(AppError::InvalidBlockNumber(format!(
                "range {from}..{to} is empty"
            )));
        }

        println!("Backfilling blocks {from}..{to}");
        let mut total = 0u64;
        for (chunk_from, chunk_to) in block_chunks(from, to, self.settings.backfill_chunk) {
            let published = self.process_range(chunk_from, chunk_to).await?;
            total += published;
            println!("  blocks {chunk_from}..{chunk_to}: {published} swaps");
        }
        println!("Backfill complete: {total} swaps");

        if realtime {
            self.run_realtime(Some(to + 1)).await?;
        }
        Ok(())
    }

    /// Tail the chain head. The watermark is the next unprocessed block;
    /// a failed poll leaves it in place so the same range is retried.
    /// Rate-limit errors back off exponentially, anything else transient
    /// waits the regular poll interval.
    pub async fn run_realtime(&mut self, start: Option<u64>) -> Result<(), AppError> {
        let mut next_block = match start {
            Some(block) => block,
            None => chain::latest_block(&self.provider).await? + 1,
        };
        let backoff = RetryPolicy::exponential(
            u32::MAX,
            self.settings.poll_interval,
            self.settings.max_backoff,
        );
        let mut consecutive_errors = 0u32;
        let mut rate_limit_streak = 0u32;
        let mut delay = self.settings.poll_interval;

        println!(
            "Tailing {} from block {next_block} (poll every {:?})",
            self.settings.name, self.settings.poll_interval
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("Shutting down");
                    return Ok(());
                }
                _ = sleep(delay) => {}
            }

            let outcome = async {
                let latest = chain::latest_block(&self.provider).await?;
                if latest >= next_block {
                    self.process_range(next_block, latest).await?;
                }
                Ok::<u64, AppError>(latest)
            }
            .await;

            next_block = next_watermark(next_block, &outcome);

            match outcome {
                Ok(_) => {
                    consecutive_errors = 0;
                    rate_limit_streak = 0;
                    delay = self.settings.poll_interval;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    if is_rate_limited(&err.to_string()) {
                        rate_limit_streak += 1;
                        delay = backoff.delay_for(rate_limit_streak);
                    } else {
                        rate_limit_streak = 0;
                        delay = self.settings.poll_interval;
                    }
                    eprintln!("Poll failed ({consecutive_errors} in a row): {err}");
                    if consecutive_errors >= self.settings.max_consecutive_errors {
                        eprintln!(
                            "Repeated failures. Check RPC_URL connectivity and provider rate \
                             limits; retrying blocks from {next_block} after {delay:?}"
                        );
                    }
                }
            }
        }
    }

    /// Decode every swap in one transaction's receipt
    pub async fn process_transaction(&mut self, tx_hash: B256) -> Result<(), AppError> {
        let receipt = chain::fetch_receipt(&self.provider, tx_hash, &self.receipt_policy).await?;

        let mut published = 0u64;
        for log in receipt.inner.logs() {
            if self.handle_log(log).await? {
                published += 1;
            }
        }

        if published == 0 {
            println!("No swap events found in transaction {tx_hash}");
        } else {
            println!("{published} swap(s) decoded from {tx_hash}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use alloy::primitives::{Address, Bytes, LogData, B256};

    use crate::cache::TokenDescriptor;

    use super::*;

    fn settings_scoped_to(keys: &[&str]) -> ChainSettings {
        ChainSettings {
            chain_id: 1,
            name: "Ethereum".into(),
            rpc_url: "http://localhost:8545".into(),
            native_token: TokenDescriptor {
                address: Address::ZERO.to_string().to_lowercase(),
                symbol: "ETH".into(),
                name: "Ethereum".into(),
                decimals: 18,
            },
            pool_filter: keys.iter().map(|k| k.to_lowercase()).collect(),
            v4_pool_manager: Address::repeat_byte(0x44),
            v4_deployment_block: 0,
            poll_interval: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            backfill_chunk: 2000,
            init_scan_chunk: 50000,
            cache_dir: PathBuf::from("cache"),
            receipt_retries: 3,
            receipt_retry_delay: Duration::from_millis(500),
            log_fetch_retries: 5,
            max_consecutive_errors: 3,
        }
    }

    #[test]
    fn watermark_advances_past_a_processed_head() {
        assert_eq!(next_watermark(100, &Ok(105)), 106);
    }

    #[test]
    fn watermark_holds_when_a_poll_fails() {
        let failed: Result<u64, AppError> = Err(AppError::Rpc("429".into()));
        assert_eq!(next_watermark(100, &failed), 100);
    }

    #[test]
    fn watermark_never_decreases() {
        // an idle poll reports a head behind the watermark
        assert_eq!(next_watermark(100, &Ok(90)), 100);

        // error-then-success: the retried range picks up exactly where the
        // failed poll left off, no gap and no regression
        let polls: Vec<Result<u64, AppError>> =
            vec![Err(AppError::Rpc("limit exceeded".into())), Ok(107)];
        let mut watermark = 100u64;
        for outcome in &polls {
            let advanced = next_watermark(watermark, outcome);
            assert!(advanced >= watermark);
            watermark = advanced;
        }
        assert_eq!(watermark, 108);
    }

    #[test]
    fn address_scope_narrows_the_query() {
        let pair = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";
        let settings = settings_scoped_to(&[pair]);

        let filter = scoped_filter(&settings, Filter::new());
        let scoped = Address::from_str(pair).unwrap();
        assert!(filter.address.matches(&scoped));
        assert!(!filter.address.matches(&Address::repeat_byte(0x01)));
    }

    #[test]
    fn pool_id_scope_targets_the_pool_manager_topic() {
        let pool_id = B256::repeat_byte(0x77);
        let settings = settings_scoped_to(&[&pool_id.to_string()]);

        let filter = scoped_filter(&settings, Filter::new());
        assert!(filter.address.matches(&settings.v4_pool_manager));
        assert!(filter.topics[1].matches(&pool_id));
        assert!(!filter.topics[1].matches(&B256::repeat_byte(0x88)));
    }

    #[test]
    fn mixed_scope_stays_client_side() {
        let settings = settings_scoped_to(&[
            "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc",
            &B256::repeat_byte(0x77).to_string(),
        ]);

        let filter = scoped_filter(&settings, Filter::new());
        assert!(filter.address.is_empty());
        assert!(filter.topics[1].is_empty());
    }

    fn log_with(topics: Vec<B256>, address: Address) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address,
                data: LogData::new_unchecked(topics, Bytes::new()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn v2_logs_are_keyed_by_emitting_pair() {
        let pair = Address::repeat_byte(0xab);
        let log = log_with(vec![IUniswapV2Pair::Swap::SIGNATURE_HASH], pair);
        assert_eq!(pool_key_of(&log), Some(pair.to_string().to_lowercase()));
    }

    #[test]
    fn v4_logs_are_keyed_by_pool_id_topic() {
        let pool_id = B256::repeat_byte(0x77);
        let log = log_with(
            vec![IPoolManager::Swap::SIGNATURE_HASH, pool_id],
            Address::repeat_byte(0x01),
        );
        assert_eq!(pool_key_of(&log), Some(pool_id.to_string().to_lowercase()));
    }

    #[test]
    fn unrelated_logs_have_no_key() {
        let log = log_with(vec![B256::repeat_byte(0x11)], Address::repeat_byte(0x02));
        assert_eq!(pool_key_of(&log), None);
    }
}
