//! Thin adapters over the JSON-RPC provider: connection, log queries and
//! receipt lookups wrapped in the retry policies from `retry`.

use alloy::{
    primitives::B256,
    providers::{Provider, ProviderBuilder},
    rpc::types::{Filter, Log, TransactionReceipt},
};

use crate::{
    error::AppError,
    retry::{with_retry, RetryPolicy},
};

pub async fn connect(rpc_url: &str) -> Result<impl Provider + Clone, AppError> {
    Ok(ProviderBuilder::new().on_builtin(rpc_url).await?)
}

pub async fn latest_block<P: Provider>(provider: &P) -> Result<u64, AppError> {
    Ok(provider.get_block_number().await?)
}

/// Fetch logs, retrying transient provider errors with backoff
pub async fn fetch_logs<P: Provider>(
    provider: &P,
    filter: &Filter,
    policy: &RetryPolicy,
) -> Result<Vec<Log>, AppError> {
    with_retry(policy, || async move {
        Ok(provider.get_logs(filter).await?)
    })
    .await
}

/// Split an inclusive block range into inclusive sub-ranges of at most
/// `chunk` blocks, oldest first
pub fn block_chunks(from: u64, to: u64, chunk: u64) -> Vec<(u64, u64)> {
    let chunk = chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = to.min(start.saturating_add(chunk - 1));
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Fetch a transaction receipt, retrying on indexing lag: the node that
/// announced the transaction may not have indexed its receipt yet.
pub async fn fetch_receipt<P: Provider>(
    provider: &P,
    tx_hash: B256,
    policy: &RetryPolicy,
) -> Result<TransactionReceipt, AppError> {
    with_retry(policy, || async move {
        provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| AppError::ReceiptNotFound(tx_hash.to_string()))
    })
    .await
}
