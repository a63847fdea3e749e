use std::{env, str::FromStr, sync::Arc};

use alloy::primitives::B256;

use cache::MetadataCache;
use config::ChainSettings;
use error::AppError;
use events::SwapDecoder;
use resolve::MetadataResolver;
use service::IngestionService;
use sink::Sink;

mod cache;
mod chain;
mod config;
mod contracts;
mod error;
mod events;
mod resolve;
mod retry;
mod service;
mod sink;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Tail new blocks from the chain head
    Tail,
    /// Backfill a block range, optionally continuing into tailing
    Historical {
        from: u64,
        to: Option<u64>,
        realtime: bool,
    },
    /// Scope to one pair address, V3 pool address, or V4 pool id
    Pool {
        key: String,
        from: Option<u64>,
        realtime: bool,
    },
    /// Decode the swaps in a single transaction
    Tx { hash: B256 },
}

fn parse_block(raw: &str) -> Result<u64, AppError> {
    raw.parse::<u64>()
        .map_err(|_| AppError::InvalidBlockNumber(raw.to_string()))
}

fn parse_command(args: &[String]) -> Result<Command, AppError> {
    let mut positional = Vec::new();
    let mut realtime = false;
    for arg in args {
        if arg == "--realtime" {
            realtime = true;
        } else {
            positional.push(arg.as_str());
        }
    }

    match positional.split_first() {
        None => Ok(Command::Tail),
        Some((&"historical", rest)) => {
            let from = rest.first().ok_or_else(|| {
                AppError::Usage("historical <from_block> [to_block] [--realtime]".into())
            })?;
            Ok(Command::Historical {
                from: parse_block(from)?,
                to: rest.get(1).map(|raw| parse_block(raw)).transpose()?,
                realtime,
            })
        }
        Some((&"pool", rest)) => {
            let key = rest.first().ok_or_else(|| {
                AppError::Usage("pool <address_or_pool_id> [from_block] [--realtime]".into())
            })?;
            Ok(Command::Pool {
                key: key.to_lowercase(),
                from: rest.get(1).map(|raw| parse_block(raw)).transpose()?,
                realtime,
            })
        }
        Some((&"tx", rest)) => {
            let raw = rest
                .first()
                .ok_or_else(|| AppError::Usage("tx <transaction_hash>".into()))?;
            let hash =
                B256::from_str(raw).map_err(|_| AppError::InvalidTxHash(raw.to_string()))?;
            Ok(Command::Tx { hash })
        }
        Some((other, _)) => Err(AppError::Usage(format!(
            "unknown command `{other}`; expected historical, pool, or tx"
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    println!("Starting DEX swap listener...");

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let mut settings = ChainSettings::from_env()?;
    if let Command::Pool { key, .. } = &command {
        settings.scope_to_pool(key);
        println!("Scoped to pool {key}");
    }

    let provider = chain::connect(&settings.rpc_url).await?;
    println!("Connected to chain: {} (ID: {})", settings.name, settings.chain_id);

    let cache = Arc::new(MetadataCache::new(&settings.cache_dir, settings.chain_id));
    let resolver = Arc::new(MetadataResolver::new(
        provider.clone(),
        cache,
        &settings,
    ));
    let decoder = SwapDecoder::new(provider.clone(), resolver, &settings);
    let sink = Sink::from_env().await?;

    let mut service = IngestionService::new(provider, settings, decoder, sink);

    match command {
        Command::Tail => service.run_realtime(None).await?,
        Command::Historical { from, to, realtime } => {
            service.run_historical(from, to, realtime).await?
        }
        Command::Pool { from, realtime, .. } => match from {
            Some(from) => service.run_historical(from, None, realtime).await?,
            None => service.run_realtime(None).await?,
        },
        Command::Tx { hash } => service.process_transaction(hash).await?,
    }

    Ok(())
}
