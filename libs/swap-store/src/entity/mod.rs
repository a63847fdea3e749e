pub mod dex_swap;
pub mod pool;
pub mod pool_state;
pub mod token;

// Re-exports for convenience
pub use dex_swap::{DexSwap, NewDexSwap};
pub use pool::PoolRow;
pub use pool_state::{NewPoolState, PoolStateRow};
pub use token::TokenRow;
