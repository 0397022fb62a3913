//! Core domain layer for the gnodex indexer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services for the Gno token-balance indexer. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │             gnodex / gnodex-applier (binaries)               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  gnodex-upstream   │   gnodex-storage    │   gnodex-queue    │
//! │  (GraphQL HTTP+WS) │   (PostgreSQL)      │   (SQS)           │
//! ├────────────────────┴─────────────────────┴───────────────────┤
//! │                   gnodex-core  ← YOU ARE HERE                │
//! │                 (models, ports, services)                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Block, Transaction, Transfer, Balance, ...)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (fetcher, extractor, syncer,
//!   orchestrator, applier, integrity scanner)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Pipeline
//!
//! 1. The orchestrator runs live sync (head subscription) and backfill
//!    (chunked range traversal) in parallel under one cancel token.
//! 2. Every persisted transaction passes through the event extractor,
//!    which turns token events into `ParsedEvent`s and enqueues them.
//! 3. A separate process drains the queue through the balance applier,
//!    folding events into per-(token, account) balances idempotently.

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
