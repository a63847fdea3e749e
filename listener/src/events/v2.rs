//! Constant-product (V2) swap decoding.
//!
//! The Swap event carries amounts but no price, so the pair's reserves are
//! re-read pinned at the swap's block to price the trade consistently.

use alloy::{
    eips::BlockId,
    primitives::U256,
    providers::Provider,
    rpc::types::Log,
};

use crate::{
    contracts::IUniswapV2Pair,
    error::AppError,
    events::{
        log_position, price_from_reserves, u256_to_f64, PoolState, Protocol, SwapDecoder,
        SwapRecord,
    },
};

/// Which way the trade went: amount0In > 0 means token0 entered the pool.
/// Returns (token0_is_input, raw amount in, raw amount out).
fn flows(swap: &IUniswapV2Pair::Swap) -> (bool, U256, U256) {
    if swap.amount0In > U256::ZERO {
        (true, swap.amount0In, swap.amount1Out)
    } else {
        (false, swap.amount1In, swap.amount0Out)
    }
}

pub(super) async fn decode<P: Provider + Clone>(
    decoder: &SwapDecoder<P>,
    log: &Log,
) -> Result<SwapRecord, AppError> {
    let decoded = log
        .log_decode::<IUniswapV2Pair::Swap>()
        .map_err(|err| AppError::EventDecode(err.to_string()))?;
    let swap = &decoded.inner.data;
    let pool_address = decoded.inner.address;
    let (tx_hash, block_number) = log_position(log)?;

    let pair = decoder.resolver.pair(pool_address).await?;

    let (token0_in, amount_in, amount_out) = flows(swap);
    let (token_in, token_out) = if token0_in {
        (pair.token0.clone(), pair.token1.clone())
    } else {
        (pair.token1.clone(), pair.token0.clone())
    };

    // Reserves at the swap's block. Non-archive nodes may refuse old
    // blocks; the swap is still worth emitting with a zero price.
    let contract = IUniswapV2Pair::new(pool_address, decoder.provider.clone());
    let (reserve0, reserve1) = match contract
        .getReserves()
        .block(BlockId::from(block_number))
        .call()
        .await
    {
        Ok(reserves) => (
            U256::from(reserves.reserve0),
            U256::from(reserves.reserve1),
        ),
        Err(err) => {
            eprintln!("getReserves failed for {} at block {block_number}: {err}", pair.address);
            (U256::ZERO, U256::ZERO)
        }
    };

    let price = price_from_reserves(
        reserve0,
        reserve1,
        pair.token0.decimals,
        pair.token1.decimals,
    );

    Ok(SwapRecord {
        chain: decoder.chain_name.clone(),
        protocol: Protocol::V2,
        pool_key: pair.address.clone(),
        fee: None,
        amount_in: u256_to_f64(amount_in, token_in.decimals),
        amount_out: u256_to_f64(amount_out, token_out.decimals),
        token_in,
        token_out,
        price,
        sender: swap.sender.to_string().to_lowercase(),
        recipient: Some(swap.to.to_string().to_lowercase()),
        tx_hash,
        block_number,
        state: PoolState::Reserves {
            reserve0: reserve0.to_string(),
            reserve1: reserve1.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;

    fn swap(amount0_in: u64, amount1_in: u64, amount0_out: u64, amount1_out: u64) -> IUniswapV2Pair::Swap {
        IUniswapV2Pair::Swap {
            sender: Address::ZERO,
            amount0In: U256::from(amount0_in),
            amount1In: U256::from(amount1_in),
            amount0Out: U256::from(amount0_out),
            amount1Out: U256::from(amount1_out),
            to: Address::ZERO,
        }
    }

    #[test]
    fn token0_input_when_amount0_in_is_positive() {
        let (token0_in, amount_in, amount_out) = flows(&swap(100, 0, 0, 250));
        assert!(token0_in);
        assert_eq!(amount_in, U256::from(100u64));
        assert_eq!(amount_out, U256::from(250u64));
    }

    #[test]
    fn token1_input_when_amount0_in_is_zero() {
        let (token0_in, amount_in, amount_out) = flows(&swap(0, 500, 80, 0));
        assert!(!token0_in);
        assert_eq!(amount_in, U256::from(500u64));
        assert_eq!(amount_out, U256::from(80u64));
    }
}
