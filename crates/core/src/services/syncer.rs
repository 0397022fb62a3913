//! Thin composition of the range fetcher and the persistence layer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::IndexerResult;
use crate::ports::{RawBlock, Repositories, UpstreamSource};

use super::fetcher::RangeFetcher;

/// Composes the upstream clients with persistence; exposes ranged sync and
/// single-head handling.
pub struct Syncer<U, R> {
    fetcher: RangeFetcher<U, R>,
    repositories: Arc<R>,
}

impl<U: UpstreamSource, R: Repositories> Syncer<U, R> {
    pub fn new(fetcher: RangeFetcher<U, R>, repositories: Arc<R>) -> Self {
        Self {
            fetcher,
            repositories,
        }
    }

    /// Sync the inclusive height range `[from, to]` in chunks.
    pub async fn sync_range(
        &self,
        from: u64,
        to: u64,
        cancel: &CancellationToken,
    ) -> IndexerResult<()> {
        self.fetcher.sync_chunked(from, to, cancel).await
    }

    /// Handle one head frame: persist the block, then sync the
    /// transactions of that single height.
    #[instrument(skip(self, raw), fields(height = raw.height))]
    pub async fn handle_head(&self, raw: RawBlock) -> IndexerResult<()> {
        let height = raw.height;
        let block = raw.into_block();
        self.repositories.blocks().insert_block(&block).await?;

        self.fetcher.sync_transactions(height, height).await?;

        debug!(height, "Head processed");
        Ok(())
    }

    /// Highest persisted height, or 1 if the store is empty.
    pub async fn last_synced_height(&self) -> IndexerResult<u64> {
        Ok(self.repositories.blocks().last_synced_height().await?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use serde_json::json;

    use crate::models::EventType;
    use crate::services::extractor::EventExtractor;
    use crate::services::fetcher::{FetcherConfig, RangeFetcher};
    use crate::services::support::{
        raw_block, raw_transaction, token_event_json, MemoryQueue, MemoryRepositories,
        ScriptedUpstream,
    };

    fn syncer_with_extractor(
        upstream: ScriptedUpstream,
    ) -> (
        Syncer<ScriptedUpstream, MemoryRepositories>,
        Arc<MemoryRepositories>,
        Arc<MemoryQueue>,
    ) {
        let repositories = Arc::new(MemoryRepositories::default());
        let queue = Arc::new(MemoryQueue::default());
        let extractor = Arc::new(EventExtractor::new(repositories.clone(), queue.clone()));
        let fetcher = RangeFetcher::new(
            FetcherConfig::default(),
            Arc::new(upstream),
            repositories.clone(),
            extractor,
        );
        let syncer = Syncer::new(fetcher, repositories.clone());
        (syncer, repositories, queue)
    }

    // E2: one tx at height 10 with a Mint event flows through persistence
    // and onto the queue
    #[tokio::test]
    async fn head_with_mint_event_is_fully_extracted() {
        let mut upstream = ScriptedUpstream::default();
        upstream.transactions.push(raw_transaction(
            "txhash",
            10,
            json!([token_event_json("Mint", "", "g1abc", "100")]),
        ));
        let (syncer, repositories, queue) = syncer_with_extractor(upstream);

        syncer.handle_head(raw_block(10)).await.unwrap();

        // Block persisted
        assert!(repositories
            .blocks
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|b| b.height == 10));

        // Transfer row (hash, 0, foo, "", "g1abc", 100, 10)
        let transfers = repositories.transfers.rows.lock().unwrap();
        assert_eq!(transfers.len(), 1);
        let t = &transfers[0];
        assert_eq!(t.tx_hash, "txhash");
        assert_eq!(t.event_index, 0);
        assert_eq!(t.token_path, "gno.land/r/demo/foo");
        assert_eq!(t.from_address, "");
        assert_eq!(t.to_address, "g1abc");
        assert_eq!(t.amount, BigDecimal::from(100));
        assert_eq!(t.block_height, 10);

        // Token registered lazily
        assert!(repositories
            .tokens
            .rows
            .lock()
            .unwrap()
            .contains_key("gno.land/r/demo/foo"));

        // Event row with the raw type/func and the fixed attr layout
        let events = repositories.events.rows.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.event_type, "Transfer");
        assert_eq!(events[0].1.func, "Mint");
        let attrs = repositories.events.attrs.lock().unwrap();
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[2].1.key, "value");
        assert_eq!(attrs[2].1.value, "100");

        // Parsed event on the queue
        let queued = queue.messages.lock().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].event_type, EventType::Mint);
    }

    #[tokio::test]
    async fn replaying_a_head_does_not_duplicate_rows() {
        let mut upstream = ScriptedUpstream::default();
        upstream.transactions.push(raw_transaction(
            "txhash",
            10,
            json!([token_event_json("Mint", "", "g1abc", "100")]),
        ));
        let (syncer, repositories, _) = syncer_with_extractor(upstream);

        syncer.handle_head(raw_block(10)).await.unwrap();
        syncer.handle_head(raw_block(10)).await.unwrap();

        assert_eq!(repositories.blocks.rows.lock().unwrap().len(), 1);
        assert_eq!(repositories.transactions.rows.lock().unwrap().len(), 1);
        assert_eq!(repositories.transfers.rows.lock().unwrap().len(), 1);
        assert_eq!(repositories.events.rows.lock().unwrap().len(), 1);
        assert_eq!(repositories.events.attrs.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn last_synced_height_defaults_to_one() {
        let (syncer, _, _) = syncer_with_extractor(ScriptedUpstream::default());
        assert_eq!(syncer.last_synced_height().await.unwrap(), 1);
    }
}
