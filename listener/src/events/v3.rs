//! Concentrated-liquidity (V3) swap decoding. Price comes straight from the
//! sqrtPriceX96 the event carries, no extra RPC round-trip needed.

use alloy::{
    primitives::{I256, U256},
    providers::Provider,
    rpc::types::Log,
};

use crate::{
    contracts::IUniswapV3Pool,
    error::AppError,
    events::{
        log_position, price_from_sqrt_x96, u256_to_f64, PoolState, Protocol, SwapDecoder,
        SwapRecord,
    },
};

/// Signed deltas are from the swapper's perspective: a negative amount0
/// means the swapper spent token0. Returns (token0_is_input, in, out).
fn flows(amount0: I256, amount1: I256) -> (bool, U256, U256) {
    if amount0.is_negative() {
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
        .log_decode::<IUniswapV3Pool::Swap>()
        .map_err(|err| AppError::EventDecode(err.to_string()))?;
    let swap = &decoded.inner.data;
    let pool_address = decoded.inner.address;
    let (tx_hash, block_number) = log_position(log)?;

    let pool = decoder.resolver.pool_v3(pool_address).await?;

    let (token0_in, amount_in, amount_out) = flows(swap.amount0, swap.amount1);
    let (token_in, token_out) = if token0_in {
        (pool.token0.clone(), pool.token1.clone())
    } else {
        (pool.token1.clone(), pool.token0.clone())
    };

    let sqrt_price = U256::from(swap.sqrtPriceX96);
    let price = price_from_sqrt_x96(sqrt_price, pool.token0.decimals, pool.token1.decimals);

    Ok(SwapRecord {
        chain: decoder.chain_name.clone(),
        protocol: Protocol::V3,
        pool_key: pool.address.clone(),
        fee: Some(pool.fee),
        amount_in: u256_to_f64(amount_in, token_in.decimals),
        amount_out: u256_to_f64(amount_out, token_out.decimals),
        token_in,
        token_out,
        price,
        sender: swap.sender.to_string().to_lowercase(),
        recipient: Some(swap.recipient.to_string().to_lowercase()),
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
    fn negative_amount0_means_token0_in() {
        let (token0_in, amount_in, amount_out) =
            flows(I256::try_from(-1000).unwrap(), I256::try_from(2500).unwrap());
        assert!(token0_in);
        assert_eq!(amount_in, U256::from(1000u64));
        assert_eq!(amount_out, U256::from(2500u64));
    }

    #[test]
    fn positive_amount0_means_token1_in() {
        let (token0_in, amount_in, amount_out) =
            flows(I256::try_from(400).unwrap(), I256::try_from(-900).unwrap());
        assert!(!token0_in);
        assert_eq!(amount_in, U256::from(900u64));
        assert_eq!(amount_out, U256::from(400u64));
    }
}
