//! Contract bindings for the three AMM generations plus ERC-20 metadata.
//!
//! Swap event topics (keccak256):
//! - V2: Swap(address,uint256,uint256,uint256,uint256,address)
//!   0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822
//! - V3: Swap(address,address,int256,int256,uint160,uint128,int24)
//!   0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67
//! - V4: Swap(bytes32,address,int128,int128,uint160,uint128,int24,uint24)
//!   0x40e9cecb9f5f1f1c5b9c97dec2917b7ee92e57ba5563708daca94dd84ad7112f

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function symbol() external view returns (string);
        function name() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (
            uint112 reserve0,
            uint112 reserve1,
            uint32 blockTimestampLast
        );

        event Swap(
            address indexed sender,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out,
            address indexed to
        );
    }
}

sol! {
    #[sol(rpc)]
    interface IUniswapV3Pool {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function fee() external view returns (uint24);

        event Swap(
            address indexed sender,
            address indexed recipient,
            int256 amount0,
            int256 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick
        );
    }
}

sol! {
    #[sol(rpc)]
    interface IPoolManager {
        /// Emitted once when a pool is created; the only on-chain mapping
        /// from an opaque pool id to its constituent currencies.
        event Initialize(
            bytes32 indexed id,
            address indexed currency0,
            address indexed currency1,
            uint24 fee,
            int24 tickSpacing,
            address hooks,
            uint160 sqrtPriceX96,
            int24 tick
        );

        event Swap(
            bytes32 indexed id,
            address indexed sender,
            int128 amount0,
            int128 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick,
            uint24 fee
        );
    }
}
