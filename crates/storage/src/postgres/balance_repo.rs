//! Balance repository.
//!
//! The upsert keeps `last_block_height` monotonic in SQL so that concurrent
//! writers cannot regress the witness columns.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use gnodex_core::error::{StorageError, StorageResult};
use gnodex_core::models::Balance;
use gnodex_core::ports::BalanceRepository;

pub struct PgBalanceRepository {
    pool: PgPool,
}

impl PgBalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_BALANCE: &str = r#"
SELECT address, token_path, amount, last_tx_hash, last_block_height, updated_at
FROM balances
"#;

#[async_trait]
impl BalanceRepository for PgBalanceRepository {
    async fn get_balance(&self, token_path: &str, address: &str) -> StorageResult<Balance> {
        let row = sqlx::query_as::<_, BalanceRow>(
            &format!("{SELECT_BALANCE} WHERE token_path = $1 AND address = $2"),
        )
        .bind(token_path)
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(BalanceRow::into_balance)
            .ok_or_else(|| StorageError::NotFound(format!("balance {token_path}/{address}")))
    }

    async fn upsert_balance(&self, balance: &Balance) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (
                address, token_path, amount, last_tx_hash, last_block_height, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (address, token_path) DO UPDATE SET
                amount = EXCLUDED.amount,
                last_tx_hash = CASE
                    WHEN EXCLUDED.last_block_height > balances.last_block_height
                    THEN EXCLUDED.last_tx_hash
                    ELSE balances.last_tx_hash
                END,
                last_block_height = GREATEST(balances.last_block_height, EXCLUDED.last_block_height),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&balance.address)
        .bind(&balance.token_path)
        .bind(&balance.amount)
        .bind(&balance.last_tx_hash)
        .bind(balance.last_block_height as i64)
        .bind(balance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn list_by_address(&self, address: &str) -> StorageResult<Vec<Balance>> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            &format!("{SELECT_BALANCE} WHERE address = $1 ORDER BY token_path"),
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(rows.into_iter().map(BalanceRow::into_balance).collect())
    }

    async fn list_by_token(&self, token_path: &str) -> StorageResult<Vec<Balance>> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            &format!("{SELECT_BALANCE} WHERE token_path = $1 ORDER BY address"),
        )
        .bind(token_path)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(rows.into_iter().map(BalanceRow::into_balance).collect())
    }

    async fn list_all(&self) -> StorageResult<Vec<Balance>> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            &format!("{SELECT_BALANCE} ORDER BY token_path, address"),
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(rows.into_iter().map(BalanceRow::into_balance).collect())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct BalanceRow {
    address: String,
    token_path: String,
    amount: BigDecimal,
    last_tx_hash: String,
    last_block_height: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl BalanceRow {
    fn into_balance(self) -> Balance {
        Balance {
            address: self.address,
            token_path: self.token_path,
            amount: self.amount,
            last_tx_hash: self.last_tx_hash,
            last_block_height: self.last_block_height as u64,
            updated_at: self.updated_at,
        }
    }
}
