//! Block repository.

use async_trait::async_trait;
use sqlx::PgPool;

use gnodex_core::error::{StorageError, StorageResult};
use gnodex_core::models::Block;
use gnodex_core::ports::BlockRepository;

pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn insert_block(&self, block: &Block) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (hash, height, parent_hash, time, num_txs, total_txs)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (hash) DO NOTHING
            "#,
        )
        .bind(&block.hash)
        .bind(block.height as i64)
        .bind(&block.parent_hash)
        .bind(block.time)
        .bind(block.num_txs as i32)
        .bind(block.total_txs as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn get_block(&self, height: u64) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT hash, height, parent_hash, time, num_txs, total_txs
            FROM blocks
            WHERE height = $1
            "#,
        )
        .bind(height as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(BlockRow::into_block))
    }

    async fn last_synced_height(&self) -> StorageResult<u64> {
        let (height,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(height), 1) FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(height.max(1) as u64)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct BlockRow {
    hash: String,
    height: i64,
    parent_hash: String,
    time: chrono::DateTime<chrono::Utc>,
    num_txs: i32,
    total_txs: i64,
}

impl BlockRow {
    fn into_block(self) -> Block {
        Block {
            hash: self.hash,
            height: self.height as u64,
            parent_hash: self.parent_hash,
            time: self.time,
            num_txs: self.num_txs as u32,
            total_txs: self.total_txs as u64,
        }
    }
}
