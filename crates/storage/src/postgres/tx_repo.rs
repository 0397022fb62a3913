//! Transaction repository. Opaque JSON payloads are stored verbatim.

use async_trait::async_trait;
use sqlx::PgPool;

use gnodex_core::error::{StorageError, StorageResult};
use gnodex_core::models::Transaction;
use gnodex_core::ports::TransactionRepository;

pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn insert_transaction(&self, tx: &Transaction) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                hash, tx_index, block_height, success, gas_wanted, gas_used,
                memo, content_raw, gas_fee, messages, response
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (hash) DO NOTHING
            "#,
        )
        .bind(&tx.hash)
        .bind(tx.index_in_block as i32)
        .bind(tx.block_height as i64)
        .bind(tx.success)
        .bind(tx.gas_wanted)
        .bind(tx.gas_used)
        .bind(&tx.memo)
        .bind(&tx.content_raw)
        .bind(&tx.gas_fee)
        .bind(&tx.messages)
        .bind(&tx.response)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn get_transaction(&self, hash: &str) -> StorageResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT hash, tx_index, block_height, success, gas_wanted, gas_used,
                   memo, content_raw, gas_fee, messages, response
            FROM transactions
            WHERE hash = $1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(TransactionRow::into_transaction))
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct TransactionRow {
    hash: String,
    tx_index: i32,
    block_height: i64,
    success: bool,
    gas_wanted: i64,
    gas_used: i64,
    memo: String,
    content_raw: String,
    gas_fee: Option<serde_json::Value>,
    messages: Option<serde_json::Value>,
    response: Option<serde_json::Value>,
}

impl TransactionRow {
    fn into_transaction(self) -> Transaction {
        Transaction {
            hash: self.hash,
            index_in_block: self.tx_index as u32,
            block_height: self.block_height as u64,
            success: self.success,
            gas_wanted: self.gas_wanted,
            gas_used: self.gas_used,
            memo: self.memo,
            content_raw: self.content_raw,
            gas_fee: self.gas_fee.unwrap_or(serde_json::Value::Null),
            messages: self.messages.unwrap_or(serde_json::Value::Null),
            response: self.response.unwrap_or(serde_json::Value::Null),
        }
    }
}
