//! Balance application: folds parsed events into per-(token, account) state.
//!
//! The applier drains the event queue and mutates balance rows. Delivery is
//! at-least-once and unordered, so every apply is guarded: a replayed event
//! whose transfer row exists and whose balance witnesses have already
//! advanced is a no-op.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{IndexerResult, StorageError};
use crate::metrics::{
    record_balance_clamped, record_event_applied, record_event_skipped,
};
use crate::models::{Balance, EventType, ParsedEvent};
use crate::ports::{EventQueue, Repositories};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the balance applier.
#[derive(Debug, Clone)]
pub struct ApplierConfig {
    /// Pause after a dequeue failure before the loop restarts.
    pub error_backoff: Duration,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            error_backoff: Duration::from_secs(1),
        }
    }
}

// =============================================================================
// BalanceApplier
// =============================================================================

/// Consumes parsed events and mutates balance rows.
///
/// Run one instance per queue unless the storage layer provides
/// compare-and-set on `(address, token_path)`; the SQL witness guard keeps
/// `last_block_height` monotonic either way.
pub struct BalanceApplier<R, Q> {
    config: ApplierConfig,
    repositories: Arc<R>,
    queue: Arc<Q>,
}

impl<R: Repositories, Q: EventQueue> BalanceApplier<R, Q> {
    pub fn new(config: ApplierConfig, repositories: Arc<R>, queue: Arc<Q>) -> Self {
        Self {
            config,
            repositories,
            queue,
        }
    }

    /// Drain the queue until the token cancels.
    ///
    /// Per-event failures are logged and the rest of the batch continues;
    /// dequeue failures restart the loop after a short backoff.
    #[instrument(skip_all)]
    pub async fn run(&self, cancel: CancellationToken) -> IndexerResult<()> {
        info!("⚖️  Balance applier starting");

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("⚖️  Balance applier stopping");
                    return Ok(());
                }
                batch = self.queue.receive() => batch,
            };

            let events = match batch {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "⚠️  Dequeue failed, restarting receive loop");
                    tokio::time::sleep(self.config.error_backoff).await;
                    continue;
                }
            };

            if events.is_empty() {
                continue;
            }

            debug!(count = events.len(), "Applying event batch");
            for event in &events {
                if let Err(e) = self.apply_event(event).await {
                    warn!(
                        tx = %event.tx_hash,
                        index = event.event_index,
                        error = %e,
                        "Failed to apply event"
                    );
                }
            }
        }
    }

    /// Fold one event into balances.
    ///
    /// Returns `Ok(false)` when the replay guard skipped the event.
    pub async fn apply_event(&self, event: &ParsedEvent) -> IndexerResult<bool> {
        self.repositories
            .tokens()
            .register_if_absent(&event.token_path)
            .await?;

        if self.already_folded(event).await? {
            debug!(
                tx = %event.tx_hash,
                index = event.event_index,
                "Replayed event already folded, skipping"
            );
            record_event_skipped();
            return Ok(false);
        }

        match event.event_type {
            EventType::Mint => {
                self.credit(&event.to_address, event).await?;
            }
            EventType::Burn => {
                self.debit(&event.from_address, event).await?;
            }
            EventType::Transfer => {
                self.debit(&event.from_address, event).await?;
                self.credit(&event.to_address, event).await?;
            }
        }

        record_event_applied(event.event_type.as_str());
        Ok(true)
    }

    /// Replay guard: the event has already been folded when its transfer
    /// row exists and every touched balance carries a witness at or past
    /// the event's height.
    async fn already_folded(&self, event: &ParsedEvent) -> IndexerResult<bool> {
        let transfer_exists = self
            .repositories
            .transfers()
            .exists(&event.tx_hash, event.event_index)
            .await?;
        if !transfer_exists {
            return Ok(false);
        }

        for address in [&event.from_address, &event.to_address] {
            if address.is_empty() {
                continue;
            }
            match self
                .repositories
                .balances()
                .get_balance(&event.token_path, address)
                .await
            {
                Ok(balance) => {
                    if balance.last_block_height < event.block_height {
                        return Ok(false);
                    }
                }
                Err(StorageError::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(true)
    }

    async fn credit(&self, address: &str, event: &ParsedEvent) -> IndexerResult<()> {
        let current = self.load_or_default(address, &event.token_path).await?;
        let amount = &current.amount + &event.amount;
        self.store(current, event, amount).await
    }

    async fn debit(&self, address: &str, event: &ParsedEvent) -> IndexerResult<()> {
        let current = self.load_or_default(address, &event.token_path).await?;
        let mut amount = &current.amount - &event.amount;

        // Clamp rule: upstream anomalies or reordered delivery may drive a
        // balance below zero; clamp and leave a trace for operators.
        if amount < BigDecimal::zero() {
            warn!(
                token = %event.token_path,
                address = %address,
                balance = %current.amount,
                debit = %event.amount,
                "⚠️  Balance would go negative, clamping to zero"
            );
            record_balance_clamped(&event.token_path);
            amount = BigDecimal::zero();
        }

        self.store(current, event, amount).await
    }

    async fn load_or_default(&self, address: &str, token_path: &str) -> IndexerResult<Balance> {
        match self
            .repositories
            .balances()
            .get_balance(token_path, address)
            .await
        {
            Ok(balance) => Ok(balance),
            Err(StorageError::NotFound(_)) => Ok(Balance {
                address: address.to_string(),
                token_path: token_path.to_string(),
                amount: BigDecimal::zero(),
                last_tx_hash: String::new(),
                last_block_height: 0,
                updated_at: Utc::now(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the new amount, advancing the height witness only forward.
    async fn store(
        &self,
        current: Balance,
        event: &ParsedEvent,
        amount: BigDecimal,
    ) -> IndexerResult<()> {
        let (last_tx_hash, last_block_height) = if event.block_height > current.last_block_height {
            (event.tx_hash.clone(), event.block_height)
        } else {
            (current.last_tx_hash, current.last_block_height)
        };

        self.repositories
            .balances()
            .upsert_balance(&Balance {
                address: current.address,
                token_path: current.token_path,
                amount,
                last_tx_hash,
                last_block_height,
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::support::{MemoryQueue, MemoryRepositories};

    const TOKEN: &str = "gno.land/r/demo/foo";

    fn applier() -> (
        BalanceApplier<MemoryRepositories, MemoryQueue>,
        Arc<MemoryRepositories>,
    ) {
        let repositories = Arc::new(MemoryRepositories::default());
        let queue = Arc::new(MemoryQueue::default());
        let applier = BalanceApplier::new(ApplierConfig::default(), repositories.clone(), queue);
        (applier, repositories)
    }

    fn event(
        event_type: EventType,
        from: &str,
        to: &str,
        amount: u64,
        tx_hash: &str,
        height: u64,
    ) -> ParsedEvent {
        ParsedEvent {
            event_type,
            token_path: TOKEN.into(),
            from_address: from.into(),
            to_address: to.into(),
            amount: BigDecimal::from(amount),
            tx_hash: tx_hash.into(),
            block_height: height,
            event_index: 0,
        }
    }

    async fn balance_of(repositories: &MemoryRepositories, address: &str) -> Balance {
        use crate::ports::Repositories as _;
        repositories
            .balances()
            .get_balance(TOKEN, address)
            .await
            .unwrap()
    }

    /// Insert the transfer row the extractor would have written for `ev`.
    async fn seed_transfer(repositories: &MemoryRepositories, ev: &ParsedEvent) {
        use crate::models::Transfer;
        use crate::ports::Repositories as _;
        repositories
            .transfers()
            .insert_transfer(&Transfer {
                tx_hash: ev.tx_hash.clone(),
                event_index: ev.event_index,
                token_path: ev.token_path.clone(),
                from_address: ev.from_address.clone(),
                to_address: ev.to_address.clone(),
                amount: ev.amount.clone(),
                block_height: ev.block_height,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    // E2: a mint credits the recipient and registers the token
    #[tokio::test]
    async fn mint_credits_recipient() {
        let (applier, repositories) = applier();
        let mint = event(EventType::Mint, "", "g1abc", 100, "tx-mint", 10);

        assert!(applier.apply_event(&mint).await.unwrap());

        let balance = balance_of(&repositories, "g1abc").await;
        assert_eq!(balance.amount, BigDecimal::from(100));
        assert_eq!(balance.last_tx_hash, "tx-mint");
        assert_eq!(balance.last_block_height, 10);
        assert!(repositories.tokens.rows.lock().unwrap().contains_key(TOKEN));
    }

    // E3: replaying an already-folded event is a no-op
    #[tokio::test]
    async fn replayed_event_is_skipped() {
        let (applier, repositories) = applier();
        let mint = event(EventType::Mint, "", "g1abc", 100, "tx-mint", 10);
        seed_transfer(&repositories, &mint).await;

        assert!(applier.apply_event(&mint).await.unwrap());
        assert!(!applier.apply_event(&mint).await.unwrap());

        let balance = balance_of(&repositories, "g1abc").await;
        assert_eq!(balance.amount, BigDecimal::from(100));
    }

    // E4: a burn past zero clamps to zero
    #[tokio::test]
    async fn burn_past_zero_clamps() {
        let (applier, repositories) = applier();
        applier
            .apply_event(&event(EventType::Mint, "", "g1abc", 100, "tx-mint", 10))
            .await
            .unwrap();

        applier
            .apply_event(&event(EventType::Burn, "g1abc", "", 150, "tx-burn", 11))
            .await
            .unwrap();

        let balance = balance_of(&repositories, "g1abc").await;
        assert_eq!(balance.amount, BigDecimal::zero());
        assert_eq!(balance.last_block_height, 11);
    }

    // Conservation: a transfer moves value without creating or destroying it
    #[tokio::test]
    async fn transfer_conserves_value() {
        let (applier, repositories) = applier();
        applier
            .apply_event(&event(EventType::Mint, "", "g1from", 100, "tx-mint", 10))
            .await
            .unwrap();

        applier
            .apply_event(&event(
                EventType::Transfer,
                "g1from",
                "g1to",
                40,
                "tx-transfer",
                11,
            ))
            .await
            .unwrap();

        let from = balance_of(&repositories, "g1from").await;
        let to = balance_of(&repositories, "g1to").await;
        assert_eq!(from.amount, BigDecimal::from(60));
        assert_eq!(to.amount, BigDecimal::from(40));
        assert_eq!(&from.amount + &to.amount, BigDecimal::from(100));
    }

    // Monotonic witness: an out-of-order event mutates the amount but
    // never regresses last_block_height
    #[tokio::test]
    async fn witness_height_never_decreases() {
        let (applier, repositories) = applier();
        applier
            .apply_event(&event(EventType::Mint, "", "g1abc", 100, "tx-late", 20))
            .await
            .unwrap();

        applier
            .apply_event(&event(EventType::Mint, "", "g1abc", 5, "tx-early", 10))
            .await
            .unwrap();

        let balance = balance_of(&repositories, "g1abc").await;
        assert_eq!(balance.amount, BigDecimal::from(105));
        assert_eq!(balance.last_block_height, 20);
        assert_eq!(balance.last_tx_hash, "tx-late");
    }

    // A transfer whose row exists but whose recipient witness lags is not
    // treated as folded
    #[tokio::test]
    async fn partially_folded_transfer_is_reapplied() {
        let (applier, repositories) = applier();
        let transfer = event(
            EventType::Transfer,
            "g1from",
            "g1to",
            40,
            "tx-transfer",
            30,
        );
        seed_transfer(&repositories, &transfer).await;

        // Sender has seen height 30 already; recipient has no row at all
        applier
            .apply_event(&event(EventType::Mint, "", "g1from", 100, "tx-mint", 30))
            .await
            .unwrap();

        assert!(applier.apply_event(&transfer).await.unwrap());
        assert_eq!(
            balance_of(&repositories, "g1to").await.amount,
            BigDecimal::from(40)
        );
    }

    #[tokio::test]
    async fn amounts_beyond_u64_fold_exactly() {
        let (applier, repositories) = applier();
        let big = "36893488147419103232"; // 2^65
        let mut mint = event(EventType::Mint, "", "g1abc", 0, "tx-big", 10);
        mint.amount = big.parse().unwrap();

        applier.apply_event(&mint).await.unwrap();

        let balance = balance_of(&repositories, "g1abc").await;
        assert_eq!(balance.amount.to_string(), big);
    }
}
