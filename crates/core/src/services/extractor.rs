//! Event extraction: transaction payloads into typed token events.
//!
//! An event is token-relevant when its `type` is `Transfer` and its `func`
//! is one of `Mint`, `Burn`, `Transfer`. Relevant events are persisted
//! (tx_events, tx_event_attrs, transfers, lazy token registration) and
//! forwarded to the event queue for balance application.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{ExtractError, ExtractResult, IndexerResult};
use crate::metrics::{record_event_enqueued, record_events_extracted};
use crate::models::{
    parse_token_amount, EventType, GnoEvent, ParsedEvent, Transaction, Transfer, TxEvent,
    TxEventAttr,
};
use crate::ports::{EventQueue, Repositories, TransactionProcessor};

// =============================================================================
// Parsing
// =============================================================================

/// Decode the event list from a transaction's opaque response payload.
///
/// A missing or null response (or event list) means no events. Upstream
/// union members other than `GnoEvent` arrive as empty objects and are
/// simply never token-relevant.
pub fn decode_events(tx: &Transaction) -> ExtractResult<Vec<GnoEvent>> {
    let events = match tx.response.get("events") {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::Array(values)) => values,
        Some(other) => {
            return Err(ExtractError::MalformedResponse {
                tx_hash: tx.hash.clone(),
                message: format!("events is not an array: {}", other),
            });
        }
    };

    Ok(events
        .iter()
        .map(|value| serde_json::from_value(value.clone()).unwrap_or_default())
        .collect())
}

/// Whether an event mutates token balances.
pub fn is_token_event(event: &GnoEvent) -> bool {
    event.event_type == "Transfer" && matches!(event.func.as_str(), "Mint" | "Burn" | "Transfer")
}

/// Classify an event by its declared function and address shape.
///
/// Shapes that do not match their function fall back to TRANSFER.
pub fn determine_event_type(func: &str, from: &str, to: &str) -> EventType {
    match func {
        "Mint" if from.is_empty() && !to.is_empty() => EventType::Mint,
        "Burn" if !from.is_empty() && to.is_empty() => EventType::Burn,
        _ => EventType::Transfer,
    }
}

/// Parse one token-relevant event at `event_index` (its unfiltered position
/// in the transaction's event list).
pub fn parse_token_event(
    event: &GnoEvent,
    tx: &Transaction,
    event_index: u32,
) -> ExtractResult<ParsedEvent> {
    let mut from_address = String::new();
    let mut to_address = String::new();
    let mut raw_value = String::new();

    for attr in &event.attrs {
        match attr.key.as_str() {
            "from" => from_address = attr.value.clone(),
            "to" => to_address = attr.value.clone(),
            "value" => raw_value = attr.value.clone(),
            _ => {}
        }
    }

    let amount = parse_token_amount(&raw_value).ok_or_else(|| ExtractError::BadEventAmount {
        tx_hash: tx.hash.clone(),
        event_index,
        value: raw_value.clone(),
    })?;

    let event_type = determine_event_type(&event.func, &from_address, &to_address);

    Ok(ParsedEvent {
        event_type,
        token_path: event.pkg_path.clone(),
        from_address,
        to_address,
        amount,
        tx_hash: tx.hash.clone(),
        block_height: tx.block_height,
        event_index,
    })
}

/// Parse every token-relevant event of a transaction.
///
/// A bad amount aborts the whole transaction's event processing.
pub fn parse_transaction_events(tx: &Transaction) -> ExtractResult<Vec<(GnoEvent, ParsedEvent)>> {
    let events = decode_events(tx)?;

    let mut parsed = Vec::new();
    for (index, event) in events.into_iter().enumerate() {
        if !is_token_event(&event) {
            continue;
        }
        let token_event = parse_token_event(&event, tx, index as u32)?;
        parsed.push((event, token_event));
    }
    Ok(parsed)
}

// =============================================================================
// EventExtractor
// =============================================================================

/// Production [`TransactionProcessor`]: persists token events and forwards
/// them to the event queue.
pub struct EventExtractor<R, Q> {
    repositories: Arc<R>,
    queue: Arc<Q>,
}

impl<R: Repositories, Q: EventQueue> EventExtractor<R, Q> {
    pub fn new(repositories: Arc<R>, queue: Arc<Q>) -> Self {
        Self {
            repositories,
            queue,
        }
    }

    /// Persist one token event: register its token, store the event row and
    /// its attributes in the original's fixed layout (from@0, to@1,
    /// value@2), then the transfer row.
    async fn persist_event(&self, event: &GnoEvent, parsed: &ParsedEvent) -> IndexerResult<()> {
        self.repositories
            .tokens()
            .register_if_absent(&parsed.token_path)
            .await?;

        let event_id = self
            .repositories
            .events()
            .insert_event(&TxEvent {
                tx_hash: parsed.tx_hash.clone(),
                event_index: parsed.event_index,
                event_type: event.event_type.clone(),
                func: event.func.clone(),
                pkg_path: event.pkg_path.clone(),
            })
            .await?;

        let attrs = [
            TxEventAttr {
                attr_index: 0,
                key: "from".into(),
                value: parsed.from_address.clone(),
            },
            TxEventAttr {
                attr_index: 1,
                key: "to".into(),
                value: parsed.to_address.clone(),
            },
            TxEventAttr {
                attr_index: 2,
                key: "value".into(),
                value: parsed.amount.to_string(),
            },
        ];
        self.repositories.events().insert_attrs(event_id, &attrs).await?;

        self.repositories
            .transfers()
            .insert_transfer(&Transfer {
                tx_hash: parsed.tx_hash.clone(),
                event_index: parsed.event_index,
                token_path: parsed.token_path.clone(),
                from_address: parsed.from_address.clone(),
                to_address: parsed.to_address.clone(),
                amount: parsed.amount.clone(),
                block_height: parsed.block_height,
                created_at: Utc::now(),
            })
            .await?;

        Ok(())
    }
}

#[async_trait]
impl<R: Repositories, Q: EventQueue> TransactionProcessor for EventExtractor<R, Q> {
    async fn process_transaction(&self, tx: &Transaction) -> IndexerResult<()> {
        let events = parse_transaction_events(tx)?;
        if events.is_empty() {
            return Ok(());
        }

        debug!(tx = %tx.hash, count = events.len(), "Token events found");

        for (event, parsed) in &events {
            self.persist_event(event, parsed).await?;
            record_events_extracted(parsed.event_type.as_str(), 1);

            // Enqueue failures do not fail the sync; an integrity re-walk
            // re-extracts and re-sends.
            match self.queue.send(parsed).await {
                Ok(()) => record_event_enqueued(),
                Err(e) => {
                    warn!(
                        tx = %parsed.tx_hash,
                        index = parsed.event_index,
                        error = %e,
                        "Failed to enqueue event"
                    );
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
