use sqlx::{
    types::chrono::{DateTime, Utc},
    Executor, Postgres,
};

/// DexSwap entity representing one decoded swap in the `dex_swaps` table
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DexSwap {
    pub time: DateTime<Utc>,
    pub chain: String,
    pub dex: String,
    pub pool_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub price: f64,
    pub tx_hash: String,
    pub block_number: i64,
}

/// Input for inserting a new swap row
#[derive(Debug, Clone)]
pub struct NewDexSwap {
    pub chain: String,
    pub dex: String,
    pub pool_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub price: f64,
    pub tx_hash: String,
    pub block_number: i64,
}

impl DexSwap {
    /// Insert a swap row. Duplicate delivery across restarts is acceptable,
    /// so there is no conflict clause: the table is append-only.
    pub async fn create<'c, E>(swap: &NewDexSwap, connection: E) -> Result<(), sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let query = r#"
            INSERT INTO dex_swaps (time, chain, dex, pool_address, token_in, token_out,
                                   amount_in, amount_out, price, tx_hash, block_number)
            VALUES (NOW(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#;

        sqlx::query(query)
            .bind(&swap.chain)
            .bind(&swap.dex)
            .bind(&swap.pool_address)
            .bind(&swap.token_in)
            .bind(&swap.token_out)
            .bind(swap.amount_in)
            .bind(swap.amount_out)
            .bind(swap.price)
            .bind(&swap.tx_hash)
            .bind(swap.block_number)
            .execute(connection)
            .await?;

        Ok(())
    }

    /// Most recent swaps for a pool, newest first
    pub async fn find_recent_by_pool<'c, E>(
        pool_address: &str,
        limit: i64,
        connection: E,
    ) -> Result<Vec<DexSwap>, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        sqlx::query_as::<_, DexSwap>(
            "SELECT * FROM dex_swaps WHERE pool_address = $1 ORDER BY time DESC LIMIT $2",
        )
        .bind(pool_address)
        .bind(limit)
        .fetch_all(connection)
        .await
    }
}
