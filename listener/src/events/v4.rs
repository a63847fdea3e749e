//! Singleton-manager (V4) swap decoding. Every pool's swaps come out of one
//! PoolManager contract, keyed by an indexed pool id, and the event already
//! carries the fee since V4 pools can charge dynamic fees.

use alloy::{primitives::U256, providers::Provider, rpc::types::Log};

use crate::{
    contracts::IPoolManager,
    error::AppError,
    events::{
        log_position, price_from_sqrt_x96, u128_to_f64, PoolState, Protocol, SwapDecoder,
        SwapRecord,
    },
};

/// Same sign convention as V3, int128-sized: negative amount0 means the
/// swapper spent currency0
fn flows(amount0: i128, amount1: i128) -> (bool, u128, u128) {
    if amount0 < 0 {
        (true, amount0.unsigned_abs(), amount1.unsigned_abs())
    } else {
        (false, amount1.unsigned_abs(), amount0.unsigned_abs())
    }
}

pub(super) async fn decode<P: Provider + Clone>(
    decoder: &SwapDecoder<P>,
    log: &Log,
) -> Result<SwapRecord, AppError> {
    let decoded = log
        .log_decode::<IPoolManager::Swap>()
        .map_err(|err| AppError::EventDecode(err.to_string()))?;
    let swap = &decoded.inner.data;
    let (tx_hash, block_number) = log_position(log)?;

    let pool = decoder.resolver.pool_v4(swap.id).await?;

    let (currency0_in, amount_in, amount_out) = flows(swap.amount0, swap.amount1);
    let (token_in, token_out) = if currency0_in {
        (pool.currency0.clone(), pool.currency1.clone())
    } else {
        (pool.currency1.clone(), pool.currency0.clone())
    };

    let sqrt_price = U256::from(swap.sqrtPriceX96);
    let price = price_from_sqrt_x96(
        sqrt_price,
        pool.currency0.decimals,
        pool.currency1.decimals,
    );

    Ok(SwapRecord {
        chain: decoder.chain_name.clone(),
        protocol: Protocol::V4,
        pool_key: pool.pool_id.clone(),
        fee: Some(swap.fee.to::<u32>()),
        amount_in: u128_to_f64(amount_in, token_in.decimals),
        amount_out: u128_to_f64(amount_out, token_out.decimals),
        token_in,
        token_out,
        price,
        sender: swap.sender.to_string().to_lowercase(),
        recipient: None,
        tx_hash,
        block_number,
        state: PoolState::SqrtPrice {
            sqrt_price_x96: sqrt_price.to_string(),
            liquidity: swap.liquidity.to_string(),
            tick: swap.tick.as_i32(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_amount0_means_currency0_in() {
        let (currency0_in, amount_in, amount_out) = flows(-750, 1200);
        assert!(currency0_in);
        assert_eq!(amount_in, 750);
        assert_eq!(amount_out, 1200);
    }

    #[test]
    fn positive_amount0_means_currency1_in() {
        let (currency0_in, amount_in, amount_out) = flows(300, -640);
        assert!(!currency0_in);
        assert_eq!(amount_in, 640);
        assert_eq!(amount_out, 300);
    }

    #[test]
    fn int128_min_does_not_overflow() {
        let (_, amount_in, _) = flows(i128::MIN, 1);
        assert_eq!(amount_in, i128::MIN.unsigned_abs());
    }
}
