use sqlx::{
    types::chrono::{DateTime, Utc},
    Executor, Postgres,
};

/// Pool entity for the `pools` reference table.
///
/// `pool_address` holds the pair/pool contract address for V2/V3 and the
/// hex-encoded pool id for V4 (which has no standalone contract).
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PoolRow {
    pub pool_address: String,
    pub chain: String,
    pub dex: String,
    pub token0_address: Option<String>,
    pub token1_address: Option<String>,
    pub fee_tier: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PoolRow {
    /// Upsert a pool record keyed by pool address / pool id
    pub async fn upsert<'c, E>(
        pool_address: &str,
        chain: &str,
        dex: &str,
        token0: &str,
        token1: &str,
        fee_tier: f64,
        connection: E,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let query = r#"
            INSERT INTO pools (pool_address, chain, dex, token0_address, token1_address, fee_tier)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (pool_address) DO UPDATE SET
                token0_address = EXCLUDED.token0_address,
                token1_address = EXCLUDED.token1_address,
                fee_tier = EXCLUDED.fee_tier,
                last_updated = NOW()
        "#;

        sqlx::query(query)
            .bind(pool_address)
            .bind(chain)
            .bind(dex)
            .bind(token0)
            .bind(token1)
            .bind(fee_tier)
            .execute(connection)
            .await?;

        Ok(())
    }

    /// Find pool by address / pool id
    pub async fn find_by_address<'c, E>(
        pool_address: &str,
        connection: E,
    ) -> Result<Option<PoolRow>, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        sqlx::query_as::<_, PoolRow>("SELECT * FROM pools WHERE pool_address = $1")
            .bind(pool_address)
            .fetch_optional(connection)
            .await
    }
}
