//! Integrity scanner: re-walk the full range to repair gaps.
//!
//! Every write is idempotent, so re-running the chunked path fills missing
//! rows and leaves present rows untouched.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::error::IndexerResult;
use crate::ports::{HeadSubscription, Repositories, UpstreamSource};

use super::orchestrator::probe_head;
use super::syncer::Syncer;

/// On-demand re-walk of heights `1..=head`.
pub struct IntegrityScanner<U, R, H> {
    syncer: Arc<Syncer<U, R>>,
    heads: Arc<H>,
}

impl<U, R, H> IntegrityScanner<U, R, H>
where
    U: UpstreamSource,
    R: Repositories,
    H: HeadSubscription,
{
    pub fn new(syncer: Arc<Syncer<U, R>>, heads: Arc<H>) -> Self {
        Self { syncer, heads }
    }

    /// Probe the current head and re-sync the entire range.
    ///
    /// Succeeds if at least one chunk succeeded.
    #[instrument(skip_all)]
    pub async fn run(&self, cancel: &CancellationToken) -> IndexerResult<()> {
        info!("🔎 Integrity scan starting");

        let head = probe_head(self.heads.as_ref(), cancel).await?;
        info!(head, "🔎 Re-walking full range from height 1");

        self.syncer.sync_range(1, head, cancel).await?;

        info!(head, "🔎 Integrity scan complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
