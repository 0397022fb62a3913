//! Token repository. Tokens are registered lazily on first event; symbol
//! and decimals stay empty until discovered.

use async_trait::async_trait;
use sqlx::PgPool;

use gnodex_core::error::{StorageError, StorageResult};
use gnodex_core::models::Token;
use gnodex_core::ports::TokenRepository;

pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn register_if_absent(&self, path: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (path, symbol, decimals, created_at)
            VALUES ($1, '', 0, NOW())
            ON CONFLICT (path) DO NOTHING
            "#,
        )
        .bind(path)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn get_token(&self, path: &str) -> StorageResult<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT path, symbol, decimals, created_at FROM tokens WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(TokenRow::into_token))
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct TokenRow {
    path: String,
    symbol: String,
    decimals: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TokenRow {
    fn into_token(self) -> Token {
        Token {
            path: self.path,
            symbol: self.symbol,
            decimals: self.decimals as u32,
            created_at: self.created_at,
        }
    }
}
