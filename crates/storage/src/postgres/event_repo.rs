//! Transaction event and attribute repository.

use async_trait::async_trait;
use sqlx::PgPool;

use gnodex_core::error::{StorageError, StorageResult};
use gnodex_core::models::{TxEvent, TxEventAttr};
use gnodex_core::ports::TxEventRepository;

pub struct PgTxEventRepository {
    pool: PgPool,
}

impl PgTxEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TxEventRepository for PgTxEventRepository {
    async fn insert_event(&self, event: &TxEvent) -> StorageResult<i64> {
        // RETURNING yields no row when the conflict target already exists;
        // fall back to reading the existing id.
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO tx_events (tx_hash, event_index, type, func, pkg_path)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tx_hash, event_index) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&event.tx_hash)
        .bind(event.event_index as i32)
        .bind(&event.event_type)
        .bind(&event.func)
        .bind(&event.pkg_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (i64,) = sqlx::query_as(
            "SELECT id FROM tx_events WHERE tx_hash = $1 AND event_index = $2",
        )
        .bind(&event.tx_hash)
        .bind(event.event_index as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(id)
    }

    async fn insert_attrs(&self, event_id: i64, attrs: &[TxEventAttr]) -> StorageResult<()> {
        for attr in attrs {
            sqlx::query(
                r#"
                INSERT INTO tx_event_attrs (event_id, attr_index, key, value)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (event_id, attr_index) DO NOTHING
                "#,
            )
            .bind(event_id)
            .bind(attr.attr_index as i32)
            .bind(&attr.key)
            .bind(&attr.value)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        Ok(())
    }
}
