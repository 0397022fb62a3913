//! Orchestrates live sync and backfill as parallel tasks.
//!
//! Both tasks run under cancellation tokens descended from a common parent.
//! Live sync errors end the orchestrator (and cancel backfill); backfill
//! errors are logged while live sync continues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::metrics::record_head_frame;
use crate::ports::{HeadHandler, HeadSubscription, RawBlock, Repositories, UpstreamSource};

use super::syncer::Syncer;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attempts per head frame before live sync gives up.
    pub head_retry_attempts: u32,
    /// Delay between head retry attempts.
    pub head_retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            head_retry_attempts: 3,
            head_retry_delay: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs live sync and backfill concurrently over one syncer.
pub struct Orchestrator<U, R, H> {
    config: OrchestratorConfig,
    syncer: Arc<Syncer<U, R>>,
    heads: Arc<H>,
}

impl<U, R, H> Orchestrator<U, R, H>
where
    U: UpstreamSource + 'static,
    R: Repositories + 'static,
    H: HeadSubscription + 'static,
{
    pub fn new(config: OrchestratorConfig, syncer: Arc<Syncer<U, R>>, heads: Arc<H>) -> Self {
        Self {
            config,
            syncer,
            heads,
        }
    }

    /// Run until live sync fails or the parent token cancels.
    ///
    /// Backfill completion never ends the run; a backfill error is logged
    /// and live sync continues.
    #[instrument(skip_all)]
    pub async fn run(&self, cancel: CancellationToken) -> IndexerResult<()> {
        info!("🚀 Starting orchestrated sync");

        let live_cancel = cancel.child_token();
        let backfill_cancel = cancel.child_token();

        let mut live = tokio::spawn(run_live_sync(
            self.config.clone(),
            self.syncer.clone(),
            self.heads.clone(),
            live_cancel,
        ));
        let mut backfill = tokio::spawn(run_backfill(
            self.syncer.clone(),
            self.heads.clone(),
            backfill_cancel.clone(),
        ));

        tokio::select! {
            live_res = &mut live => {
                backfill_cancel.cancel();
                let _ = backfill.await;
                flatten(live_res)
            }
            backfill_res = &mut backfill => {
                match flatten(backfill_res) {
                    Ok(()) => info!("⏮️  Backfill completed"),
                    Err(e) => warn!(error = %e, "⚠️  Backfill failed; live sync continues"),
                }
                flatten(live.await)
            }
        }
    }
}

fn flatten(res: Result<IndexerResult<()>, tokio::task::JoinError>) -> IndexerResult<()> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(IndexerError::Internal(format!("task join error: {e}"))),
    }
}

// =============================================================================
// Live Sync
// =============================================================================

/// Subscribe to the head stream; each frame is handed to the syncer with
/// bounded retries. A frame that fails after retries terminates live sync.
async fn run_live_sync<U, R, H>(
    config: OrchestratorConfig,
    syncer: Arc<Syncer<U, R>>,
    heads: Arc<H>,
    cancel: CancellationToken,
) -> IndexerResult<()>
where
    U: UpstreamSource + 'static,
    R: Repositories + 'static,
    H: HeadSubscription,
{
    info!("📡 Live sync starting");

    let (fatal_tx, mut fatal_rx) = mpsc::channel::<IndexerError>(1);

    let handler: HeadHandler = Arc::new(move |block: RawBlock| {
        let syncer = syncer.clone();
        let fatal_tx = fatal_tx.clone();
        let attempts = config.head_retry_attempts;
        let delay = config.head_retry_delay;

        Box::pin(async move {
            record_head_frame();
            let height = block.height;

            if let Err(e) = handle_head_with_retry(&syncer, block, attempts, delay).await {
                error!(height, error = %e, "❌ Head failed after retries");
                let _ = fatal_tx.try_send(IndexerError::HeadFailed {
                    height,
                    attempts,
                    source: Box::new(e),
                });
            }
            Ok(())
        })
    });

    let subscription_id = heads.subscribe_heads(handler).await?;
    info!(id = %subscription_id, "📡 Head subscription established");

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            info!("📡 Live sync stopping");
            Ok(())
        }
        fatal = fatal_rx.recv() => match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        },
    };

    if let Err(e) = heads.stop(&subscription_id).await {
        warn!(id = %subscription_id, error = %e, "Failed to stop head subscription");
    }
    result
}

/// Process one head with up to `attempts` tries, `delay` apart.
async fn handle_head_with_retry<U, R>(
    syncer: &Syncer<U, R>,
    block: RawBlock,
    attempts: u32,
    delay: Duration,
) -> IndexerResult<()>
where
    U: UpstreamSource,
    R: Repositories,
{
    let mut last_error = IndexerError::Internal("head retry loop ran zero attempts".into());

    for attempt in 1..=attempts.max(1) {
        match syncer.handle_head(block.clone()).await {
            Ok(()) => {
                info!(height = block.height, "⛓️  Head synced");
                return Ok(());
            }
            Err(e) => {
                warn!(
                    height = block.height,
                    attempt,
                    error = %e,
                    "Head processing failed, retrying"
                );
                last_error = e;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_error)
}

// =============================================================================
// Backfill
// =============================================================================

/// Probe the current head, then sync from the last persisted height.
async fn run_backfill<U, R, H>(
    syncer: Arc<Syncer<U, R>>,
    heads: Arc<H>,
    cancel: CancellationToken,
) -> IndexerResult<()>
where
    U: UpstreamSource,
    R: Repositories,
    H: HeadSubscription,
{
    let head = probe_head(heads.as_ref(), &cancel).await?;
    let last_synced = syncer.last_synced_height().await?;

    if last_synced >= head {
        info!(last_synced, head, "⏮️  No backfill needed");
        return Ok(());
    }

    info!(from = last_synced + 1, to = head, "⏮️  Backfill starting");
    syncer.sync_range(last_synced + 1, head, &cancel).await
}

/// Observe the current chain head via a one-shot subscription.
pub async fn probe_head(
    heads: &dyn HeadSubscription,
    cancel: &CancellationToken,
) -> IndexerResult<u64> {
    let (height_tx, height_rx) = oneshot::channel::<u64>();
    let height_tx = Arc::new(Mutex::new(Some(height_tx)));

    let handler: HeadHandler = Arc::new(move |block: RawBlock| {
        let height_tx = height_tx.clone();
        Box::pin(async move {
            if let Some(sender) = height_tx.lock().await.take() {
                let _ = sender.send(block.height);
            }
            Ok(())
        })
    });

    tokio::select! {
        res = heads.subscribe_heads_once(handler) => res?,
        _ = cancel.cancelled() => return Err(IndexerError::ShutdownRequested),
    }

    let head = height_rx
        .await
        .map_err(|_| IndexerError::Internal("head probe returned no frame".into()))?;

    if head == 0 {
        return Err(IndexerError::Internal("invalid head height 0".into()));
    }
    Ok(head)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NoopProcessor;
    use crate::services::fetcher::{FetcherConfig, RangeFetcher};
    use crate::services::support::{raw_block, MemoryRepositories, ScriptedHeads, ScriptedUpstream};

    fn build_syncer(
        upstream: ScriptedUpstream,
    ) -> (
        Arc<Syncer<ScriptedUpstream, MemoryRepositories>>,
        Arc<MemoryRepositories>,
    ) {
        let repositories = Arc::new(MemoryRepositories::default());
        let fetcher = RangeFetcher::new(
            FetcherConfig::default(),
            Arc::new(upstream),
            repositories.clone(),
            Arc::new(NoopProcessor),
        );
        (Arc::new(Syncer::new(fetcher, repositories.clone())), repositories)
    }

    #[tokio::test]
    async fn probe_head_reads_one_frame() {
        let heads = ScriptedHeads {
            head: 42,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        assert_eq!(probe_head(&heads, &cancel).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn probe_head_observes_cancellation() {
        let heads = ScriptedHeads {
            hang_once: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = probe_head(&heads, &cancel).await.unwrap_err();
        assert!(matches!(err, IndexerError::ShutdownRequested));
    }

    #[tokio::test]
    async fn probe_head_rejects_zero_height() {
        let heads = ScriptedHeads::default(); // head = 0
        let cancel = CancellationToken::new();
        assert!(probe_head(&heads, &cancel).await.is_err());
    }

    // Backfill catches up from the last synced height; parent cancel ends
    // the run cleanly
    #[tokio::test(start_paused = true)]
    async fn backfill_catches_up_then_cancel_ends_run() {
        let (syncer, repositories) = build_syncer(ScriptedUpstream::with_heights(&[2, 3]));
        let heads = Arc::new(ScriptedHeads {
            head: 3,
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), syncer, heads);

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { orchestrator.run(run_cancel).await });

        // Wait for backfill to land both blocks, then shut down
        for _ in 0..100 {
            if repositories.blocks.rows.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        handle.await.unwrap().unwrap();
        assert_eq!(repositories.blocks.rows.lock().unwrap().len(), 2);
    }

    // A head frame that keeps failing exhausts its 3 attempts and takes
    // live sync (and the orchestrator) down
    #[tokio::test(start_paused = true)]
    async fn live_failure_after_retries_ends_the_run() {
        let mut upstream = ScriptedUpstream::with_heights(&[2, 3, 5]);
        // handle_head(5) queries transactions with the window (4, 6)
        upstream.failing_windows.push((4, 6));
        let (syncer, _) = build_syncer(upstream);
        let heads = Arc::new(ScriptedHeads {
            frames: vec![raw_block(5)],
            head: 5,
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), syncer, heads);

        let err = orchestrator
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            IndexerError::HeadFailed {
                height, attempts, ..
            } => {
                assert_eq!(height, 5);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
