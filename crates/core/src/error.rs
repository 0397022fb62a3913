//! Error types for the indexer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ClientError`] - Upstream GraphQL transport errors (query and stream)
//! - [`ExtractError`] - Event extraction errors
//! - [`StorageError`] - Database/repository errors
//! - [`QueueError`] - Event queue errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Upstream Client Errors
// =============================================================================

/// Errors from the upstream GraphQL client (query or stream transport).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure, non-success HTTP status, or broken socket.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response carried an unexpected media type.
    #[error("Unexpected content type: {0}")]
    Content(String),

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The GraphQL response carried a non-empty error array.
    #[error("Upstream errors: {0}")]
    Upstream(String),

    /// WebSocket connection or protocol handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Subscription lifecycle error (unknown id, already stopped, ...).
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// The stream client is closed and cannot serve new subscriptions.
    #[error("Stream client closed")]
    Closed,
}

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors from parsing transaction payloads into token events.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Event `value` attribute was not a non-negative decimal integer.
    ///
    /// Aborts event processing for the owning transaction; the transaction
    /// row itself is still persisted.
    #[error("Bad event amount {value:?} in tx {tx_hash} event {event_index}")]
    BadEventAmount {
        tx_hash: String,
        event_index: u32,
        value: String,
    },

    /// The transaction response payload had an unexpected shape.
    #[error("Malformed response payload in tx {tx_hash}: {message}")]
    MalformedResponse { tx_hash: String, message: String },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found (balance lookups only).
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Queue Errors
// =============================================================================

/// Event queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The broker did not accept the message.
    #[error("Enqueue error: {0}")]
    Enqueue(String),

    /// Receiving from the broker failed.
    #[error("Dequeue error: {0}")]
    Dequeue(String),

    /// A message body could not be decoded into a ParsedEvent.
    #[error("Message decode error: {0}")]
    Decode(String),

    /// Queue connection/setup failed.
    #[error("Queue connection error: {0}")]
    ConnectionError(String),
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by the services in
/// [`crate::services`]. It wraps all lower-level errors and adds
/// orchestration-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Upstream client error.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Event extraction error.
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Event queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Every chunk in a ranged sync failed.
    #[error("All chunks failed syncing heights {from}..={to}")]
    AllChunksFailed { from: u64, to: u64 },

    /// The requested height range is invalid.
    #[error("Invalid height range: from {from} > to {to}")]
    InvalidRange { from: u64, to: u64 },

    /// Live head processing failed after exhausting retries.
    #[error("Head {height} failed after {attempts} attempts: {source}")]
    HeadFailed {
        height: u64,
        attempts: u32,
        #[source]
        source: Box<IndexerError>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for upstream client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
