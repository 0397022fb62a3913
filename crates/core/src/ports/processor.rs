//! Narrow seam between the syncer and the event extractor.

use async_trait::async_trait;

use crate::error::IndexerResult;
use crate::models::Transaction;

/// Processes a freshly persisted transaction.
///
/// The range fetcher invokes this for every transaction it stores; the
/// event extractor is the production implementation. Keeping the seam this
/// narrow breaks the dependency cycle between syncing and extraction.
#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    async fn process_transaction(&self, tx: &Transaction) -> IndexerResult<()>;
}

/// No-op processor for sync paths that do not extract events.
pub struct NoopProcessor;

#[async_trait]
impl TransactionProcessor for NoopProcessor {
    async fn process_transaction(&self, _tx: &Transaction) -> IndexerResult<()> {
        Ok(())
    }
}
