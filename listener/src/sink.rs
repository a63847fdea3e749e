//! Output sinks for decoded swaps. Selected once at startup via the SINK
//! environment variable: `console` (default), `database`, or `redis`.

use std::env;

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use sqlx::PgPool;
use swap_store::{DexSwap, NewDexSwap, NewPoolState, PoolRow, PoolStateRow, TokenRow};

use crate::{
    error::AppError,
    events::{PoolState, SwapRecord},
};

/// Pub/sub channel downstream consumers subscribe to for decoded swaps
pub const SWAP_CHANNEL: &str = "dex:events:swap";

/// Multiplexed Redis connection publishing one JSON message per swap
pub struct RedisPublisher {
    connection: MultiplexedConnection,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client =
            Client::open(redis_url).map_err(|e| AppError::RedisConnection(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::RedisConnection(e.to_string()))?;

        println!("Connected to Redis at {redis_url}");
        Ok(Self { connection })
    }

    async fn publish_swap(&mut self, payload: &str) -> Result<(), AppError> {
        self.connection
            .publish::<_, _, ()>(SWAP_CHANNEL, payload)
            .await
            .map_err(|e| AppError::RedisPublish(e.to_string()))?;
        Ok(())
    }
}

pub enum Sink {
    Console,
    Database { pool: PgPool },
    Redis { publisher: RedisPublisher },
}

impl Sink {
    pub async fn from_env() -> Result<Self, AppError> {
        let kind = env::var("SINK").unwrap_or_else(|_| "console".to_string());
        match kind.to_lowercase().as_str() {
            "database" | "db" => {
                let pool = swap_store::initialize_database().await?;
                println!("Sink: database");
                Ok(Sink::Database { pool })
            }
            "redis" => {
                let redis_url = env::var("REDIS_URL")
                    .map_err(|_| AppError::MissingEnvVar("REDIS_URL".to_string()))?;
                let publisher = RedisPublisher::connect(&redis_url).await?;
                println!("Sink: redis ({SWAP_CHANNEL})");
                Ok(Sink::Redis { publisher })
            }
            _ => {
                println!("Sink: console");
                Ok(Sink::Console)
            }
        }
    }

    pub async fn publish(&mut self, record: &SwapRecord) -> Result<(), AppError> {
        match self {
            Sink::Console => {
                println!("{}", format_record(record));
                Ok(())
            }
            Sink::Redis { publisher } => {
                let payload = serde_json::to_string(record)
                    .map_err(|e| AppError::RedisPublish(e.to_string()))?;
                publisher.publish_swap(&payload).await
            }
            Sink::Database { pool } => write_database(pool, record).await,
        }
    }
}

/// Persist the swap plus its reference data. The swap row is the source of
/// truth and its insert error propagates; metadata upserts are best-effort
/// since a later swap will retry them anyway.
async fn write_database(pool: &PgPool, record: &SwapRecord) -> Result<(), AppError> {
    let swap = NewDexSwap {
        chain: record.chain.clone(),
        dex: record.protocol.dex_name().to_string(),
        pool_address: record.pool_key.clone(),
        token_in: record.token_in.symbol.clone(),
        token_out: record.token_out.symbol.clone(),
        amount_in: record.amount_in,
        amount_out: record.amount_out,
        price: record.price,
        tx_hash: record.tx_hash.clone(),
        block_number: record.block_number as i64,
    };
    DexSwap::create(&swap, pool).await?;

    for token in [&record.token_in, &record.token_out] {
        if let Err(err) = TokenRow::upsert(
            &token.address,
            &token.symbol,
            &token.name,
            i32::from(token.decimals),
            &record.chain,
            pool,
        )
        .await
        {
            eprintln!("Failed to upsert token {}: {err}", token.address);
        }
    }

    // token_in/token_out are swap-ordered, not pool-ordered, but the pool
    // row only needs both addresses present
    if let Err(err) = PoolRow::upsert(
        &record.pool_key,
        &record.chain,
        record.protocol.dex_name(),
        &record.token_in.address,
        &record.token_out.address,
        f64::from(record.fee.unwrap_or(0)),
        pool,
    )
    .await
    {
        eprintln!("Failed to upsert pool {}: {err}", record.pool_key);
    }

    let state = match &record.state {
        PoolState::Reserves { reserve0, reserve1 } => NewPoolState {
            reserve0: Some(reserve0.clone()),
            reserve1: Some(reserve1.clone()),
            ..state_base(record)
        },
        PoolState::SqrtPrice {
            sqrt_price_x96,
            liquidity,
            tick,
        } => NewPoolState {
            sqrt_price_x96: Some(sqrt_price_x96.clone()),
            liquidity: Some(liquidity.clone()),
            tick: Some(i64::from(*tick)),
            ..state_base(record)
        },
    };
    if let Err(err) = PoolStateRow::create(&state, pool).await {
        eprintln!("Failed to record pool state for {}: {err}", record.pool_key);
    }

    Ok(())
}

fn state_base(record: &SwapRecord) -> NewPoolState {
    NewPoolState {
        pool_address: record.pool_key.clone(),
        chain: record.chain.clone(),
        dex: record.protocol.dex_name().to_string(),
        block_number: record.block_number as i64,
        triggered_by_tx: record.tx_hash.clone(),
        ..NewPoolState::default()
    }
}

/// Human amount with up to six decimal places, trailing zeros trimmed
pub fn format_amount(value: f64) -> String {
    let text = format!("{value:.6}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Multi-line console block for one swap
pub fn format_record(record: &SwapRecord) -> String {
    let mut out = String::new();
    out.push_str("============================================================\n");
    out.push_str(&format!(
        "{} swap | {} | block {}\n",
        record.protocol.dex_name(),
        record.chain,
        record.block_number
    ));
    out.push_str(&format!("Pool:  {}\n", record.pool_key));
    if let Some(fee) = record.fee {
        out.push_str(&format!("Fee:   {} ({:.2}%)\n", fee, f64::from(fee) / 10_000.0));
    }
    out.push_str(&format!(
        "In:    {} {}\n",
        format_amount(record.amount_in),
        record.token_in.symbol
    ));
    out.push_str(&format!(
        "Out:   {} {}\n",
        format_amount(record.amount_out),
        record.token_out.symbol
    ));
    out.push_str(&format!(
        "Price: {} {} per {}\n",
        format_amount(record.price),
        record.token_out.symbol,
        record.token_in.symbol
    ));
    out.push_str(&format!("Tx:    {}", record.tx_hash));
    out
}

#[cfg(test)]
mod tests {
    use crate::{cache::TokenDescriptor, events::Protocol};

    use super::*;

    #[tokio::test]
    async fn redis_sink_requires_a_url() {
        std::env::remove_var("REDIS_URL");
        std::env::set_var("SINK", "redis");

        let result = Sink::from_env().await;
        assert!(matches!(result, Err(AppError::MissingEnvVar(_))));

        std::env::remove_var("SINK");
    }

    #[test]
    fn amounts_trim_trailing_zeros() {
        assert_eq!(format_amount(1.5), "1.5");
        assert_eq!(format_amount(2000.0), "2000");
        assert_eq!(format_amount(0.000001), "0.000001");
        assert_eq!(format_amount(0.0000001), "0");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn record_block_names_both_tokens() {
        let record = SwapRecord {
            chain: "Ethereum".into(),
            protocol: Protocol::V3,
            pool_key: "0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8".into(),
            fee: Some(3000),
            token_in: TokenDescriptor {
                address: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".into(),
                symbol: "WETH".into(),
                name: "Wrapped Ether".into(),
                decimals: 18,
            },
            token_out: TokenDescriptor {
                address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into(),
                symbol: "USDC".into(),
                name: "USD Coin".into(),
                decimals: 6,
            },
            amount_in: 1.5,
            amount_out: 2994.21,
            price: 2001.3,
            sender: "0x0000000000000000000000000000000000000001".into(),
            recipient: None,
            tx_hash: "0xabc".into(),
            block_number: 18_500_000,
            state: crate::events::PoolState::SqrtPrice {
                sqrt_price_x96: "1".into(),
                liquidity: "2".into(),
                tick: 100,
            },
        };

        let block = format_record(&record);
        assert!(block.contains("1.5 WETH"));
        assert!(block.contains("2994.21 USDC"));
        assert!(block.contains("uniswap_v3"));
        assert!(block.contains("0.30%"));
        assert!(block.contains("block 18500000"));
    }
}
