use sqlx::{Executor, Postgres};

/// Token entity for the `tokens` reference table
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TokenRow {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<i32>,
    pub chain: Option<String>,
}

impl TokenRow {
    /// Upsert a token record keyed by lowercase address
    pub async fn upsert<'c, E>(
        address: &str,
        symbol: &str,
        name: &str,
        decimals: i32,
        chain: &str,
        connection: E,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let query = r#"
            INSERT INTO tokens (address, symbol, name, decimals, chain)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (address) DO UPDATE SET
                symbol = EXCLUDED.symbol,
                name = EXCLUDED.name,
                decimals = EXCLUDED.decimals
        "#;

        sqlx::query(query)
            .bind(address)
            .bind(symbol)
            .bind(name)
            .bind(decimals)
            .bind(chain)
            .execute(connection)
            .await?;

        Ok(())
    }

    /// Find token by address
    pub async fn find_by_address<'c, E>(
        address: &str,
        connection: E,
    ) -> Result<Option<TokenRow>, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE address = $1")
            .bind(address)
            .fetch_optional(connection)
            .await
    }
}
