//! Token transfer repository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use gnodex_core::error::{StorageError, StorageResult};
use gnodex_core::models::Transfer;
use gnodex_core::ports::TransferRepository;

pub struct PgTransferRepository {
    pool: PgPool,
}

impl PgTransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransferRepository for PgTransferRepository {
    async fn insert_transfer(&self, transfer: &Transfer) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                tx_hash, event_index, token_path, from_address, to_address,
                amount, block_height, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tx_hash, event_index) DO NOTHING
            "#,
        )
        .bind(&transfer.tx_hash)
        .bind(transfer.event_index as i32)
        .bind(&transfer.token_path)
        .bind(&transfer.from_address)
        .bind(&transfer.to_address)
        .bind(&transfer.amount)
        .bind(transfer.block_height as i64)
        .bind(transfer.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn exists(&self, tx_hash: &str, event_index: u32) -> StorageResult<bool> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM transfers WHERE tx_hash = $1 AND event_index = $2
            )
            "#,
        )
        .bind(tx_hash)
        .bind(event_index as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(found)
    }

    async fn list_by_address(&self, address: &str, limit: u32) -> StorageResult<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT tx_hash, event_index, token_path, from_address, to_address,
                   amount, block_height, created_at
            FROM transfers
            WHERE from_address = $1 OR to_address = $1
            ORDER BY block_height DESC, event_index DESC
            LIMIT $2
            "#,
        )
        .bind(address)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(rows.into_iter().map(TransferRow::into_transfer).collect())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct TransferRow {
    tx_hash: String,
    event_index: i32,
    token_path: String,
    from_address: String,
    to_address: String,
    amount: BigDecimal,
    block_height: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TransferRow {
    fn into_transfer(self) -> Transfer {
        Transfer {
            tx_hash: self.tx_hash,
            event_index: self.event_index as u32,
            token_path: self.token_path,
            from_address: self.from_address,
            to_address: self.to_address,
            amount: self.amount,
            block_height: self.block_height as u64,
            created_at: self.created_at,
        }
    }
}
