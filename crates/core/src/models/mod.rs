//! Domain models representing indexed chain data.
//!
//! These models are storage-agnostic and represent the canonical
//! form of indexed data within the domain layer. Identifiers (block
//! hashes, transaction hashes, account addresses, token paths) are
//! byte-exact strings as emitted by the upstream.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Blocks & Transactions
// =============================================================================

/// Indexed block.
///
/// Created on first observation at any height; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block hash (primary key).
    pub hash: String,
    /// Block height (unique).
    pub height: u64,
    /// Hash of the parent block.
    pub parent_hash: String,
    /// Block timestamp.
    pub time: DateTime<Utc>,
    /// Number of transactions in this block.
    pub num_txs: u32,
    /// Cumulative transaction count up to this block.
    pub total_txs: u64,
}

/// Indexed transaction.
///
/// The `gas_fee`, `messages` and `response` fields preserve the upstream
/// JSON shape verbatim; only the extractor interprets `response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash (primary key).
    pub hash: String,
    /// Position within the block.
    pub index_in_block: u32,
    /// Height of the containing block.
    pub block_height: u64,
    /// Execution status.
    pub success: bool,
    /// Gas requested.
    pub gas_wanted: i64,
    /// Gas consumed.
    pub gas_used: i64,
    /// Transaction memo.
    pub memo: String,
    /// Raw transaction content.
    pub content_raw: String,
    /// Gas fee as returned by the upstream.
    pub gas_fee: serde_json::Value,
    /// Messages as returned by the upstream.
    pub messages: serde_json::Value,
    /// Execution response as returned by the upstream (holds the events).
    pub response: serde_json::Value,
}

// =============================================================================
// Events
// =============================================================================

/// Raw contract event as it appears inside `transaction.response.events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GnoEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub func: String,
    #[serde(default)]
    pub pkg_path: String,
    #[serde(default)]
    pub attrs: Vec<GnoEventAttr>,
}

/// Key/value attribute of a [`GnoEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GnoEventAttr {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Persisted transaction event, unique on `(tx_hash, event_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEvent {
    pub tx_hash: String,
    pub event_index: u32,
    pub event_type: String,
    pub func: String,
    pub pkg_path: String,
}

/// Persisted event attribute, unique on `(event_id, attr_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEventAttr {
    pub attr_index: u32,
    pub key: String,
    pub value: String,
}

// =============================================================================
// Token State
// =============================================================================

/// Persisted token transfer, unique on `(tx_hash, event_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub tx_hash: String,
    pub event_index: u32,
    pub token_path: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: BigDecimal,
    pub block_height: u64,
    pub created_at: DateTime<Utc>,
}

/// Per-(address, token) balance, mutated exclusively by the balance applier.
///
/// `last_block_height` is a monotonic witness: it never decreases across
/// updates to the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub address: String,
    pub token_path: String,
    pub amount: BigDecimal,
    pub last_tx_hash: String,
    pub last_block_height: u64,
    pub updated_at: DateTime<Utc>,
}

/// Registered token. `symbol` and `decimals` may stay empty until discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub path: String,
    pub symbol: String,
    pub decimals: u32,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Parsed Events
// =============================================================================

/// Balance-mutating event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "MINT")]
    Mint,
    #[serde(rename = "BURN")]
    Burn,
    #[serde(rename = "TRANSFER")]
    Transfer,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Mint => "MINT",
            EventType::Burn => "BURN",
            EventType::Transfer => "TRANSFER",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed output of the event extractor, carried through the event queue to
/// the balance applier. Serialized as JSON; the amount travels as a decimal
/// string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub event_type: EventType,
    pub token_path: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: BigDecimal,
    pub tx_hash: String,
    pub block_height: u64,
    pub event_index: u32,
}

/// Parse a token amount attribute.
///
/// Accepts only a non-empty string of ASCII digits. Amounts routinely exceed
/// 2^63 on this chain, so the result is arbitrary precision. Returns `None`
/// for anything else; callers attach transaction context via
/// [`crate::error::ExtractError::BadEventAmount`].
pub fn parse_token_amount(value: &str) -> Option<BigDecimal> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigDecimal::from_str(value).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(EventType::Mint.as_str(), "MINT");
        assert_eq!(
            serde_json::to_string(&EventType::Burn).unwrap(),
            "\"BURN\""
        );
        let parsed: EventType = serde_json::from_str("\"TRANSFER\"").unwrap();
        assert_eq!(parsed, EventType::Transfer);
    }

    #[test]
    fn parse_amount_accepts_plain_integers() {
        assert_eq!(parse_token_amount("0").unwrap(), BigDecimal::from(0));
        assert_eq!(parse_token_amount("100").unwrap(), BigDecimal::from(100));
    }

    #[test]
    fn parse_amount_keeps_full_precision_beyond_u64() {
        // 2^70, larger than anything a 64-bit lane could carry
        let big = "1180591620717411303424";
        let parsed = parse_token_amount(big).unwrap();
        assert_eq!(parsed.to_string(), big);
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        for bad in ["", "-1", "1.5", "1e9", " 42", "42 ", "0x10", "abc"] {
            assert!(parse_token_amount(bad).is_none(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn parsed_event_amount_travels_as_decimal_string() {
        let event = ParsedEvent {
            event_type: EventType::Mint,
            token_path: "gno.land/r/demo/foo".into(),
            from_address: String::new(),
            to_address: "g1abc".into(),
            amount: parse_token_amount("1180591620717411303424").unwrap(),
            tx_hash: "hash".into(),
            block_height: 10,
            event_index: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["amount"], "1180591620717411303424");
        assert_eq!(json["event_type"], "MINT");

        let back: ParsedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.amount, event.amount);
    }
}
