//! Chunked traversal of upstream height ranges.
//!
//! The fetcher converts inclusive `[from, to]` intent into the upstream's
//! exclusive `gt`/`lt` where-clause by passing `gt = from - 1` and
//! `lt = to + 1`. Chunk failures are logged and skipped; persisted writes
//! are idempotent, so re-running any range is safe.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::metrics::{
    record_blocks_synced, record_chunk_failed, record_chunk_synced, record_transactions_synced,
    ChunkTimer,
};
use crate::ports::{Repositories, TransactionProcessor, UpstreamSource};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for ranged fetching.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Heights per chunk.
    pub chunk_size: u64,
    /// Upper bound (exclusive) on per-block transaction index in the
    /// transactions query.
    pub tx_index_max: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            tx_index_max: 1000,
        }
    }
}

// =============================================================================
// RangeFetcher
// =============================================================================

/// Fetches blocks and transactions for height ranges and persists them.
///
/// Every stored transaction is handed to the [`TransactionProcessor`] so
/// token events reach the queue in the same pass.
pub struct RangeFetcher<U, R> {
    config: FetcherConfig,
    upstream: Arc<U>,
    repositories: Arc<R>,
    processor: Arc<dyn TransactionProcessor>,
}

impl<U: UpstreamSource, R: Repositories> RangeFetcher<U, R> {
    pub fn new(
        config: FetcherConfig,
        upstream: Arc<U>,
        repositories: Arc<R>,
        processor: Arc<dyn TransactionProcessor>,
    ) -> Self {
        Self {
            config,
            upstream,
            repositories,
            processor,
        }
    }

    /// Fetch and persist blocks for the inclusive range `[from, to]`.
    ///
    /// Per-block persistence failures are logged and skipped. Returns the
    /// number of blocks persisted.
    #[instrument(skip(self))]
    pub async fn sync_blocks(&self, from: u64, to: u64) -> IndexerResult<usize> {
        let raw_blocks = self.upstream.blocks(from.saturating_sub(1), to + 1).await?;

        let mut count = 0usize;
        for raw in raw_blocks {
            let block = raw.into_block();
            if let Err(e) = self.repositories.blocks().insert_block(&block).await {
                warn!(height = block.height, error = %e, "Failed to persist block");
                continue;
            }
            count += 1;
        }

        record_blocks_synced(count as u64);
        debug!(from, to, count, "Blocks synced");
        Ok(count)
    }

    /// Fetch and persist transactions for the inclusive range `[from, to]`,
    /// running the processor for each persisted transaction.
    ///
    /// Persistence failures skip the transaction; processor failures are
    /// logged but do not block the remaining items.
    #[instrument(skip(self))]
    pub async fn sync_transactions(&self, from: u64, to: u64) -> IndexerResult<usize> {
        let raw_txs = self
            .upstream
            .transactions(from.saturating_sub(1), to + 1, self.config.tx_index_max)
            .await?;

        let mut count = 0usize;
        for raw in raw_txs {
            let tx = raw.into_transaction();
            if let Err(e) = self.repositories.transactions().insert_transaction(&tx).await {
                warn!(tx = %tx.hash, error = %e, "Failed to persist transaction");
                continue;
            }
            count += 1;

            if let Err(e) = self.processor.process_transaction(&tx).await {
                warn!(tx = %tx.hash, error = %e, "Transaction event processing failed");
            }
        }

        record_transactions_synced(count as u64);
        debug!(from, to, count, "Transactions synced");
        Ok(count)
    }

    /// Traverse the inclusive range `[from, to]` in chunks, syncing blocks
    /// then transactions for each chunk.
    ///
    /// Failed chunks are logged and skipped. Returns `Ok` if at least one
    /// chunk succeeded, [`IndexerError::AllChunksFailed`] otherwise.
    #[instrument(skip(self, cancel))]
    pub async fn sync_chunked(
        &self,
        from: u64,
        to: u64,
        cancel: &CancellationToken,
    ) -> IndexerResult<()> {
        if from > to {
            return Err(IndexerError::InvalidRange { from, to });
        }

        let chunk_size = self.config.chunk_size.max(1);
        let total_chunks = (to - from) / chunk_size + 1;

        let mut chunk = 0u64;
        let mut succeeded = 0u64;
        let mut chunk_from = from;
        while chunk_from <= to {
            if cancel.is_cancelled() {
                return Err(IndexerError::ShutdownRequested);
            }

            let chunk_to = (chunk_from + chunk_size - 1).min(to);
            chunk += 1;
            debug!(chunk, total_chunks, chunk_from, chunk_to, "Syncing chunk");

            let _timer = ChunkTimer::new();
            match self.sync_chunk(chunk_from, chunk_to).await {
                Ok(()) => {
                    succeeded += 1;
                    record_chunk_synced();
                }
                Err(e) => {
                    warn!(chunk_from, chunk_to, error = %e, "⚠️  Chunk failed, skipping");
                    record_chunk_failed();
                }
            }

            chunk_from = chunk_to + 1;
        }

        if succeeded == 0 {
            return Err(IndexerError::AllChunksFailed { from, to });
        }

        debug!(succeeded, total_chunks, "Range sync finished");
        Ok(())
    }

    async fn sync_chunk(&self, from: u64, to: u64) -> IndexerResult<()> {
        self.sync_blocks(from, to).await?;
        self.sync_transactions(from, to).await?;
        Ok(())
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
