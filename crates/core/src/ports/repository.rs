//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `gnodex-storage`).
//!
//! Every write is idempotent on its natural key: re-running any range is
//! safe, and concurrent writers (live sync and backfill) may race on the
//! same rows without corrupting them.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{Balance, Block, Token, Transaction, Transfer, TxEvent, TxEventAttr};

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for block data.
#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Insert a block if its hash is not yet present.
    async fn insert_block(&self, block: &Block) -> StorageResult<()>;

    /// Get a block by height.
    async fn get_block(&self, height: u64) -> StorageResult<Option<Block>>;

    /// Highest persisted height, or 1 if the store is empty.
    async fn last_synced_height(&self) -> StorageResult<u64>;
}

/// Repository for transaction data.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a transaction if its hash is not yet present. Opaque JSON
    /// blobs are stored verbatim.
    async fn insert_transaction(&self, tx: &Transaction) -> StorageResult<()>;

    /// Get a transaction by hash.
    async fn get_transaction(&self, hash: &str) -> StorageResult<Option<Transaction>>;
}

/// Repository for transaction events and their attributes.
#[async_trait]
pub trait TxEventRepository: Send + Sync {
    /// Insert an event if `(tx_hash, event_index)` is not yet present.
    /// Returns the event id (existing or newly created).
    async fn insert_event(&self, event: &TxEvent) -> StorageResult<i64>;

    /// Insert attributes for an event; each is skipped if
    /// `(event_id, attr_index)` already exists.
    async fn insert_attrs(&self, event_id: i64, attrs: &[TxEventAttr]) -> StorageResult<()>;
}

/// Repository for token transfers.
#[async_trait]
pub trait TransferRepository: Send + Sync {
    /// Insert a transfer if `(tx_hash, event_index)` is not yet present.
    async fn insert_transfer(&self, transfer: &Transfer) -> StorageResult<()>;

    /// Whether a transfer with this natural key exists.
    async fn exists(&self, tx_hash: &str, event_index: u32) -> StorageResult<bool>;

    /// Transfer history touching an address (as sender or recipient),
    /// newest first.
    async fn list_by_address(&self, address: &str, limit: u32) -> StorageResult<Vec<Transfer>>;
}

/// Repository for per-(address, token) balances.
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Get a balance; `StorageError::NotFound` when the key has never been
    /// written.
    async fn get_balance(&self, token_path: &str, address: &str) -> StorageResult<Balance>;

    /// Upsert a balance on `(address, token_path)`.
    ///
    /// Implementations must keep `last_block_height` monotonic: the witness
    /// columns only advance when the incoming height is greater than the
    /// stored one.
    async fn upsert_balance(&self, balance: &Balance) -> StorageResult<()>;

    /// All balances held by an address.
    async fn list_by_address(&self, address: &str) -> StorageResult<Vec<Balance>>;

    /// All balances of a token.
    async fn list_by_token(&self, token_path: &str) -> StorageResult<Vec<Balance>>;

    /// Every balance row.
    async fn list_all(&self) -> StorageResult<Vec<Balance>>;
}

/// Repository for tokens.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Register a token path if absent; symbol and decimals stay empty
    /// until discovered.
    async fn register_if_absent(&self, path: &str) -> StorageResult<()>;

    /// Get a token by path.
    async fn get_token(&self, path: &str) -> StorageResult<Option<Token>>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Combined repository access for the indexer.
///
/// This trait provides access to all individual repositories; the backing
/// store must be safe for concurrent writers (unique constraints on the
/// natural keys above).
pub trait Repositories: Send + Sync {
    /// Access the block repository.
    fn blocks(&self) -> &dyn BlockRepository;

    /// Access the transaction repository.
    fn transactions(&self) -> &dyn TransactionRepository;

    /// Access the event repository.
    fn events(&self) -> &dyn TxEventRepository;

    /// Access the transfer repository.
    fn transfers(&self) -> &dyn TransferRepository;

    /// Access the balance repository.
    fn balances(&self) -> &dyn BalanceRepository;

    /// Access the token repository.
    fn tokens(&self) -> &dyn TokenRepository;
}
