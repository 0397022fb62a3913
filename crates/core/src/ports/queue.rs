//! Port trait for the durable event queue.
//!
//! The queue decouples event extraction from balance application with
//! at-least-once delivery: order is not guaranteed across messages and
//! duplicates are possible, which the balance applier tolerates via its
//! replay guard.

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::models::ParsedEvent;

/// At-least-once durable buffer between the extractor and the applier.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Serialize and enqueue a parsed event. Returns only on broker ack.
    async fn send(&self, event: &ParsedEvent) -> QueueResult<()>;

    /// Long-poll the broker (up to 20 s) and return 0..N events.
    ///
    /// Each returned event has already been acknowledged after a successful
    /// decode. Messages that fail to decode are left unacknowledged so the
    /// broker re-delivers them after the visibility timeout (or routes them
    /// to a dead-letter queue configured out-of-band).
    async fn receive(&self) -> QueueResult<Vec<ParsedEvent>>;

    /// Release broker resources. Idempotent.
    async fn close(&self);
}
