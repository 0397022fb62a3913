//! Port traits for the upstream chain indexer.
//!
//! The upstream exposes the same query language over two transports:
//! request/response queries ([`UpstreamSource`]) and a push head stream
//! ([`HeadSubscription`]). Implementations live in the infrastructure
//! layer (`gnodex-upstream`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{ClientResult, IndexerResult};
use crate::models::{Block, Transaction};

// =============================================================================
// Wire Types
// =============================================================================

/// Block as returned by the upstream, before domain transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    pub height: u64,
    #[serde(rename = "last_block_hash", default)]
    pub parent_hash: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub num_txs: u32,
    #[serde(default)]
    pub total_txs: u64,
}

impl RawBlock {
    /// Transform into the domain model.
    pub fn into_block(self) -> Block {
        Block {
            hash: self.hash,
            height: self.height,
            parent_hash: self.parent_hash,
            time: self.time,
            num_txs: self.num_txs,
            total_txs: self.total_txs,
        }
    }
}

/// Transaction as returned by the upstream, before domain transformation.
///
/// `gas_fee`, `messages` and `response` are carried opaquely; the domain
/// layer stores them verbatim and only the extractor looks inside
/// `response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub index: u32,
    pub hash: String,
    #[serde(default)]
    pub success: bool,
    pub block_height: u64,
    #[serde(default)]
    pub gas_wanted: i64,
    #[serde(default)]
    pub gas_used: i64,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub content_raw: String,
    #[serde(default)]
    pub gas_fee: serde_json::Value,
    #[serde(default)]
    pub messages: serde_json::Value,
    #[serde(default)]
    pub response: serde_json::Value,
}

impl RawTransaction {
    /// Transform into the domain model.
    pub fn into_transaction(self) -> Transaction {
        Transaction {
            hash: self.hash,
            index_in_block: self.index,
            block_height: self.block_height,
            success: self.success,
            gas_wanted: self.gas_wanted,
            gas_used: self.gas_used,
            memo: self.memo,
            content_raw: self.content_raw,
            gas_fee: self.gas_fee,
            messages: self.messages,
            response: self.response,
        }
    }
}

// =============================================================================
// Query Transport
// =============================================================================

/// Port trait for ranged upstream queries.
///
/// Height bounds are exclusive (`gt`/`lt`), matching the upstream
/// where-clause; the range fetcher converts inclusive intent by passing
/// `gt = from - 1, lt = to + 1`.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Fetch blocks with `height > gt AND height < lt`.
    async fn blocks(&self, gt: u64, lt: u64) -> ClientResult<Vec<RawBlock>>;

    /// Fetch transactions with `block_height > gt AND block_height < lt`
    /// and `index < imax`.
    async fn transactions(&self, gt: u64, lt: u64, imax: u32)
        -> ClientResult<Vec<RawTransaction>>;

    /// Fetch the newest block, if any.
    async fn latest_block(&self) -> ClientResult<Option<RawBlock>>;
}

// =============================================================================
// Stream Transport
// =============================================================================

/// Handler invoked for each head frame, on the reader task.
///
/// Handlers must not block indefinitely; heavy work belongs in the syncer,
/// which bounds its own retries. A returned error is logged by the stream
/// client and does not terminate the subscription.
pub type HeadHandler = Arc<dyn Fn(RawBlock) -> BoxFuture<'static, IndexerResult<()>> + Send + Sync>;

/// Port trait for the upstream head subscription.
#[async_trait]
pub trait HeadSubscription: Send + Sync {
    /// Register a long-lived head subscription.
    ///
    /// Returns the subscription id. The subscription survives reconnects:
    /// after an abnormal socket close the client re-issues `start` with the
    /// same id and keeps delivering frames to `handler`.
    async fn subscribe_heads(&self, handler: HeadHandler) -> ClientResult<String>;

    /// Subscribe, deliver exactly one head frame to `handler`, then stop.
    async fn subscribe_heads_once(&self, handler: HeadHandler) -> ClientResult<()>;

    /// Stop a single subscription by id.
    async fn stop(&self, id: &str) -> ClientResult<()>;

    /// Stop all subscriptions and close the connection. Idempotent.
    async fn close(&self);
}
