//! Metrics definitions for the indexer.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_synced_total",
        "Total number of blocks persisted from the upstream"
    );
    describe_counter!(
        "transactions_synced_total",
        "Total number of transactions persisted from the upstream"
    );
    describe_counter!(
        "chunks_synced_total",
        "Total number of range chunks synced successfully"
    );
    describe_counter!(
        "chunks_failed_total",
        "Total number of range chunks that failed and were skipped"
    );
    describe_counter!(
        "events_extracted_total",
        "Total number of token events extracted from transactions"
    );
    describe_counter!(
        "events_enqueued_total",
        "Total number of parsed events accepted by the queue broker"
    );
    describe_counter!(
        "events_applied_total",
        "Total number of parsed events folded into balances"
    );
    describe_counter!(
        "events_skipped_total",
        "Total number of replayed events skipped by the idempotency guard"
    );
    describe_counter!(
        "balance_clamps_total",
        "Total number of balance subtractions clamped to zero"
    );
    describe_counter!(
        "head_frames_total",
        "Total number of head frames received from the subscription"
    );
    describe_counter!(
        "ws_reconnects_total",
        "Total number of WebSocket reconnect attempts"
    );
    describe_histogram!(
        "chunk_sync_duration_seconds",
        "Time taken to sync one range chunk in seconds"
    );
}

/// Record persisted blocks.
pub fn record_blocks_synced(count: u64) {
    counter!("blocks_synced_total").increment(count);
}

/// Record persisted transactions.
pub fn record_transactions_synced(count: u64) {
    counter!("transactions_synced_total").increment(count);
}

/// Record a successfully synced chunk.
pub fn record_chunk_synced() {
    counter!("chunks_synced_total").increment(1);
}

/// Record a failed (skipped) chunk.
pub fn record_chunk_failed() {
    counter!("chunks_failed_total").increment(1);
}

/// Record extracted token events.
///
/// # Arguments
/// * `event_type` - "MINT", "BURN" or "TRANSFER"
pub fn record_events_extracted(event_type: &str, count: u64) {
    counter!("events_extracted_total", "type" => event_type.to_string()).increment(count);
}

/// Record an event accepted by the broker.
pub fn record_event_enqueued() {
    counter!("events_enqueued_total").increment(1);
}

/// Record an event folded into balances.
pub fn record_event_applied(event_type: &str) {
    counter!("events_applied_total", "type" => event_type.to_string()).increment(1);
}

/// Record a replayed event skipped by the idempotency guard.
pub fn record_event_skipped() {
    counter!("events_skipped_total").increment(1);
}

/// Record a subtraction clamped to zero.
pub fn record_balance_clamped(token_path: &str) {
    counter!("balance_clamps_total", "token" => token_path.to_string()).increment(1);
}

/// Record a received head frame.
pub fn record_head_frame() {
    counter!("head_frames_total").increment(1);
}

/// Record a WebSocket reconnect attempt.
pub fn record_ws_reconnect() {
    counter!("ws_reconnects_total").increment(1);
}

/// Record chunk sync duration.
pub fn record_chunk_sync_duration(duration_secs: f64) {
    histogram!("chunk_sync_duration_seconds").record(duration_secs);
}

/// A timer that automatically records chunk duration when dropped.
pub struct ChunkTimer {
    start: Instant,
}

impl ChunkTimer {
    /// Start a new chunk timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ChunkTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChunkTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_chunk_sync_duration(duration);
    }
}
