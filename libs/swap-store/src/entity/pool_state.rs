use std::str::FromStr;

use sqlx::{
    types::{
        chrono::{DateTime, Utc},
        BigDecimal,
    },
    Executor, Postgres,
};

/// Pool state snapshot row for the `dex_pool_state` table.
///
/// Reserves apply to V2 pools, sqrt price / liquidity / tick to V3 and V4;
/// the unused columns stay NULL.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PoolStateRow {
    pub time: DateTime<Utc>,
    pub pool_address: String,
    pub chain: String,
    pub dex: String,
    pub block_number: i64,
    pub triggered_by_tx: String,
    pub reserve0: Option<BigDecimal>,
    pub reserve1: Option<BigDecimal>,
    pub sqrt_price_x96: Option<BigDecimal>,
    pub liquidity: Option<BigDecimal>,
    pub tick: Option<i64>,
}

/// Input for inserting a pool state snapshot. Raw uint256 values are passed
/// as decimal strings to avoid lossy intermediate conversions.
#[derive(Debug, Clone, Default)]
pub struct NewPoolState {
    pub pool_address: String,
    pub chain: String,
    pub dex: String,
    pub block_number: i64,
    pub triggered_by_tx: String,
    pub reserve0: Option<String>,
    pub reserve1: Option<String>,
    pub sqrt_price_x96: Option<String>,
    pub liquidity: Option<String>,
    pub tick: Option<i64>,
}

fn to_numeric(value: &Option<String>) -> Option<BigDecimal> {
    value
        .as_deref()
        .and_then(|v| BigDecimal::from_str(v).ok())
}

impl PoolStateRow {
    /// Insert a pool state snapshot
    pub async fn create<'c, E>(state: &NewPoolState, connection: E) -> Result<(), sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let query = r#"
            INSERT INTO dex_pool_state (
                time, pool_address, chain, dex, block_number, triggered_by_tx,
                reserve0, reserve1, sqrt_price_x96, liquidity, tick
            )
            VALUES (NOW(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#;

        sqlx::query(query)
            .bind(&state.pool_address)
            .bind(&state.chain)
            .bind(&state.dex)
            .bind(state.block_number)
            .bind(&state.triggered_by_tx)
            .bind(to_numeric(&state.reserve0))
            .bind(to_numeric(&state.reserve1))
            .bind(to_numeric(&state.sqrt_price_x96))
            .bind(to_numeric(&state.liquidity))
            .bind(state.tick)
            .execute(connection)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_conversion_handles_large_values() {
        // sqrtPriceX96 values exceed u128; they must survive as NUMERIC
        let raw = Some("1461446703485210103287273052203988822378723970341".to_string());
        assert!(to_numeric(&raw).is_some());
        assert!(to_numeric(&None).is_none());
        assert!(to_numeric(&Some("not a number".to_string())).is_none());
    }
}
