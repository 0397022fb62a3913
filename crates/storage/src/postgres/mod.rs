//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `gnodex-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories`
//! - Individual repos: `PgBlockRepository`, `PgBalanceRepository`, etc.
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(&db);
//! ```

mod balance_repo;
mod block_repo;
mod database;
mod event_repo;
mod token_repo;
mod transfer_repo;
mod tx_repo;

pub use balance_repo::PgBalanceRepository;
pub use block_repo::PgBlockRepository;
pub use database::{Database, DatabaseConfig};
pub use event_repo::PgTxEventRepository;
pub use token_repo::PgTokenRepository;
pub use transfer_repo::PgTransferRepository;
pub use tx_repo::PgTransactionRepository;

use gnodex_core::ports::{
    BalanceRepository, BlockRepository, Repositories, TokenRepository, TransactionRepository,
    TransferRepository, TxEventRepository,
};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// Idempotency lives in the SQL (`ON CONFLICT` on every natural key), so
/// one entry point serves live sync, backfill, and the applier at once.
pub struct PgRepositories {
    blocks: PgBlockRepository,
    transactions: PgTransactionRepository,
    events: PgTxEventRepository,
    transfers: PgTransferRepository,
    balances: PgBalanceRepository,
    tokens: PgTokenRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: &Database) -> Self {
        let pool = db.pool().clone();
        Self {
            blocks: PgBlockRepository::new(pool.clone()),
            transactions: PgTransactionRepository::new(pool.clone()),
            events: PgTxEventRepository::new(pool.clone()),
            transfers: PgTransferRepository::new(pool.clone()),
            balances: PgBalanceRepository::new(pool.clone()),
            tokens: PgTokenRepository::new(pool),
        }
    }
}

impl Repositories for PgRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        &self.blocks
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        &self.transactions
    }

    fn events(&self) -> &dyn TxEventRepository {
        &self.events
    }

    fn transfers(&self) -> &dyn TransferRepository {
        &self.transfers
    }

    fn balances(&self) -> &dyn BalanceRepository {
        &self.balances
    }

    fn tokens(&self) -> &dyn TokenRepository {
        &self.tokens
    }
}
